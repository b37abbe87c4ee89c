use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::commands::AppState;
use crate::db::DbPool;
use crate::error::{CommandError, RegistryError};
use crate::types::health::HealthSnapshot;
use crate::types::stream::{NewStream, StreamConfig, StreamSummary};

pub fn streams_insert_db(pool: &DbPool, stream: &StreamConfig) -> Result<(), String> {
    let conn = pool.get().map_err(|e| e.to_string())?;
    let tags = serde_json::to_string(&stream.tags).map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO streams (id, name, manifest_url, enabled, tags, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            stream.id,
            stream.name,
            stream.manifest_url,
            stream.enabled,
            tags,
            stream.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

pub fn streams_list_db(pool: &DbPool) -> Result<Vec<StreamConfig>, String> {
    let conn = pool.get().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT id, name, manifest_url, enabled, tags, created_at
             FROM streams ORDER BY created_at, id",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map([], |row| {
            let tags: String = row.get(4)?;
            let created_at: String = row.get(5)?;
            Ok(StreamConfig {
                id: row.get(0)?,
                name: row.get(1)?,
                manifest_url: row.get(2)?,
                enabled: row.get(3)?,
                tags: serde_json::from_str(&tags).unwrap_or_default(),
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })
        .map_err(|e| e.to_string())?;

    rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
}

/// Returns whether a row was deleted.
pub fn streams_delete_db(pool: &DbPool, stream_id: &str) -> Result<bool, String> {
    let conn = pool.get().map_err(|e| e.to_string())?;
    let changed = conn
        .execute("DELETE FROM streams WHERE id = ?1", [stream_id])
        .map_err(|e| e.to_string())?;
    Ok(changed > 0)
}

fn validate(new: &NewStream) -> Result<(), CommandError> {
    if new.name.trim().is_empty() {
        return Err(CommandError::Invalid("stream name must not be empty".into()));
    }
    let url = new.manifest_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(CommandError::Invalid(format!(
            "manifest_url must be an http(s) URL, got '{url}'"
        )));
    }
    if let Some(id) = &new.id {
        if id.is_empty() || id.contains(':') {
            return Err(CommandError::Invalid(
                "stream id must be non-empty and must not contain ':'".into(),
            ));
        }
    }
    Ok(())
}

pub fn streams_list(state: &AppState) -> Vec<StreamSummary> {
    state
        .registry
        .views()
        .iter()
        .map(|view| view.summary())
        .collect()
}

pub fn stream_get(state: &AppState, stream_id: &str) -> Result<StreamSummary, CommandError> {
    Ok(state.registry.view(stream_id)?.summary())
}

pub fn stream_health(state: &AppState, stream_id: &str) -> Result<HealthSnapshot, CommandError> {
    Ok(state.registry.view(stream_id)?.health.clone())
}

/// Persists the stream, starts its worker and asks the collector to poll it.
pub async fn stream_add(state: &AppState, new: NewStream) -> Result<StreamSummary, CommandError> {
    validate(&new)?;
    let stream = StreamConfig {
        id: new
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        name: new.name.trim().to_string(),
        manifest_url: new.manifest_url.trim().to_string(),
        enabled: new.enabled,
        tags: new.tags,
        created_at: Utc::now(),
    };
    if state.registry.contains(&stream.id) {
        return Err(RegistryError::AlreadyExists(stream.id).into());
    }

    streams_insert_db(&state.pool, &stream).map_err(CommandError::Storage)?;
    let view = match state.registry.add_stream(stream.clone()) {
        Ok(view) => view,
        Err(err) => {
            let _ = streams_delete_db(&state.pool, &stream.id);
            return Err(err.into());
        }
    };

    if stream.enabled {
        if let Some(collector) = &state.collector {
            if let Err(e) = collector.start_monitoring(&stream).await {
                warn!(stream_id = %stream.id, error = %e, "collector did not accept stream");
            }
        }
    }
    info!(stream_id = %stream.id, name = %stream.name, "stream added");
    Ok(view.summary())
}

pub async fn stream_remove(state: &AppState, stream_id: &str) -> Result<(), CommandError> {
    state.registry.remove_stream(stream_id).await?;
    streams_delete_db(&state.pool, stream_id).map_err(CommandError::Storage)?;
    if let Some(collector) = &state.collector {
        if let Err(e) = collector.stop_monitoring(stream_id).await {
            warn!(%stream_id, error = %e, "collector did not stop stream");
        }
    }
    info!(%stream_id, "stream removed");
    Ok(())
}
