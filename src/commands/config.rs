use tracing::info;

use crate::commands::AppState;
use crate::db::DbPool;
use crate::error::CommandError;
use crate::types::config::MonitorConfig;

pub fn config_get_db(pool: &DbPool) -> Result<String, String> {
    let conn = pool.get().map_err(|e| e.to_string())?;
    let result: Option<String> = conn
        .query_row(
            "SELECT value FROM config WHERE key = 'main'",
            [],
            |row| row.get(0),
        )
        .ok();
    Ok(result.unwrap_or_else(|| "{}".to_string()))
}

pub fn config_set_db(pool: &DbPool, json: &str) -> Result<(), String> {
    let conn = pool.get().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO config (key, value) VALUES ('main', ?1)
         ON CONFLICT(key) DO UPDATE SET value = ?1, updated_at = datetime('now')",
        [json],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

/// Applies a JSON merge patch. The merged document must still describe a
/// valid `MonitorConfig`; otherwise nothing is stored.
pub fn config_update_db(pool: &DbPool, patch_json: &str) -> Result<String, String> {
    let current = config_get_db(pool)?;
    let mut current_val: serde_json::Value =
        serde_json::from_str(&current).map_err(|e| e.to_string())?;
    let patch_val: serde_json::Value =
        serde_json::from_str(patch_json).map_err(|e| e.to_string())?;

    merge_json(&mut current_val, &patch_val);
    serde_json::from_value::<MonitorConfig>(current_val.clone())
        .map_err(|e| format!("invalid configuration: {e}"))?;
    let merged = serde_json::to_string(&current_val).map_err(|e| e.to_string())?;
    config_set_db(pool, &merged)?;
    Ok(merged)
}

/// Stored overrides on top of the defaults.
pub fn load_monitor_config(pool: &DbPool) -> Result<MonitorConfig, String> {
    let raw = config_get_db(pool)?;
    serde_json::from_str(&raw).map_err(|e| e.to_string())
}

/// RFC 7396 merge: objects merge recursively, `null` deletes a key,
/// everything else replaces.
fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    let serde_json::Value::Object(patch_map) = patch else {
        *base = patch.clone();
        return;
    };
    if !base.is_object() {
        *base = serde_json::Value::Object(serde_json::Map::new());
    }
    if let serde_json::Value::Object(base_map) = base {
        for (key, value) in patch_map {
            if value.is_null() {
                base_map.remove(key);
            } else if value.is_object() {
                let entry = base_map
                    .entry(key.clone())
                    .or_insert(serde_json::Value::Null);
                merge_json(entry, value);
            } else {
                base_map.insert(key.clone(), value.clone());
            }
        }
    }
}

pub fn config_get(state: &AppState) -> Result<MonitorConfig, CommandError> {
    load_monitor_config(&state.pool).map_err(CommandError::Storage)
}

/// Persists the patch and pushes the result to every running worker.
pub fn config_update(state: &AppState, patch: &str) -> Result<MonitorConfig, CommandError> {
    let merged = config_update_db(&state.pool, patch).map_err(CommandError::Invalid)?;
    let settings: MonitorConfig =
        serde_json::from_str(&merged).map_err(|e| CommandError::Internal(e.to_string()))?;
    state.registry.reconfigure(settings.clone());
    info!("monitor configuration updated");
    Ok(settings)
}
