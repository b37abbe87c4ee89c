use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::commands::AppState;
use crate::db::DbPool;
use crate::error::CommandError;
use crate::types::webhook::{
    DeliveryOutcome, NewWebhook, WebhookEvent, WebhookPatch, WebhookSubscription,
};

const SELECT_WEBHOOK: &str =
    "SELECT id, name, url, enabled, events, headers, created_at FROM webhooks";

fn row_to_webhook(row: &rusqlite::Row<'_>) -> rusqlite::Result<WebhookSubscription> {
    let events: String = row.get(4)?;
    let headers: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(WebhookSubscription {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        enabled: row.get(3)?,
        events: serde_json::from_str::<Vec<WebhookEvent>>(&events).unwrap_or_default(),
        headers: serde_json::from_str::<HashMap<String, String>>(&headers).unwrap_or_default(),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

pub fn webhooks_upsert_db(pool: &DbPool, hook: &WebhookSubscription) -> Result<(), String> {
    let conn = pool.get().map_err(|e| e.to_string())?;
    let events = serde_json::to_string(&hook.events).map_err(|e| e.to_string())?;
    let headers = serde_json::to_string(&hook.headers).map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO webhooks (id, name, url, enabled, events, headers, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            name = ?2, url = ?3, enabled = ?4, events = ?5, headers = ?6",
        rusqlite::params![
            hook.id,
            hook.name,
            hook.url,
            hook.enabled,
            events,
            headers,
            hook.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

pub fn webhooks_list_db(pool: &DbPool) -> Result<Vec<WebhookSubscription>, String> {
    let conn = pool.get().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(&format!("{SELECT_WEBHOOK} ORDER BY created_at, id"))
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], row_to_webhook)
        .map_err(|e| e.to_string())?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
}

pub fn webhooks_get_db(pool: &DbPool, id: &str) -> Result<Option<WebhookSubscription>, String> {
    let conn = pool.get().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(&format!("{SELECT_WEBHOOK} WHERE id = ?1"))
        .map_err(|e| e.to_string())?;
    let mut rows = stmt
        .query_map([id], row_to_webhook)
        .map_err(|e| e.to_string())?;
    rows.next().transpose().map_err(|e| e.to_string())
}

pub fn webhooks_delete_db(pool: &DbPool, id: &str) -> Result<bool, String> {
    let conn = pool.get().map_err(|e| e.to_string())?;
    let changed = conn
        .execute("DELETE FROM webhooks WHERE id = ?1", [id])
        .map_err(|e| e.to_string())?;
    Ok(changed > 0)
}

fn validate_url(url: &str) -> Result<(), CommandError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(CommandError::Invalid(format!(
            "webhook url must be http(s), got '{url}'"
        )))
    }
}

/// Reloads subscriptions into the notifier after any change.
fn refresh_notifier(state: &AppState) -> Result<(), CommandError> {
    let hooks = webhooks_list_db(&state.pool).map_err(CommandError::Storage)?;
    state.notifier.replace_subscriptions(hooks);
    Ok(())
}

fn get_or_404(state: &AppState, id: &str) -> Result<WebhookSubscription, CommandError> {
    webhooks_get_db(&state.pool, id)
        .map_err(CommandError::Storage)?
        .ok_or_else(|| CommandError::NotFound(format!("webhook {id}")))
}

pub fn webhook_list(state: &AppState) -> Result<Vec<WebhookSubscription>, CommandError> {
    webhooks_list_db(&state.pool).map_err(CommandError::Storage)
}

pub fn webhook_create(
    state: &AppState,
    new: NewWebhook,
) -> Result<WebhookSubscription, CommandError> {
    validate_url(&new.url)?;
    if new.events.is_empty() {
        return Err(CommandError::Invalid(
            "webhook must subscribe to at least one event".into(),
        ));
    }
    let hook = WebhookSubscription {
        id: uuid::Uuid::new_v4().to_string(),
        name: new.name,
        url: new.url,
        enabled: new.enabled,
        events: new.events,
        headers: new.headers,
        created_at: Utc::now(),
    };
    webhooks_upsert_db(&state.pool, &hook).map_err(CommandError::Storage)?;
    refresh_notifier(state)?;
    info!(webhook_id = %hook.id, url = %hook.url, "webhook created");
    Ok(hook)
}

pub fn webhook_update(
    state: &AppState,
    id: &str,
    patch: WebhookPatch,
) -> Result<WebhookSubscription, CommandError> {
    let mut hook = get_or_404(state, id)?;
    if let Some(url) = patch.url {
        validate_url(&url)?;
        hook.url = url;
    }
    if let Some(name) = patch.name {
        hook.name = name;
    }
    if let Some(enabled) = patch.enabled {
        hook.enabled = enabled;
    }
    if let Some(events) = patch.events {
        hook.events = events;
    }
    if let Some(headers) = patch.headers {
        hook.headers = headers;
    }
    webhooks_upsert_db(&state.pool, &hook).map_err(CommandError::Storage)?;
    refresh_notifier(state)?;
    Ok(hook)
}

pub fn webhook_delete(state: &AppState, id: &str) -> Result<(), CommandError> {
    if !webhooks_delete_db(&state.pool, id).map_err(CommandError::Storage)? {
        return Err(CommandError::NotFound(format!("webhook {id}")));
    }
    refresh_notifier(state)?;
    info!(webhook_id = %id, "webhook deleted");
    Ok(())
}

/// One delivery attempt with a test payload, regardless of `enabled`.
pub async fn webhook_test(state: &AppState, id: &str) -> Result<DeliveryOutcome, CommandError> {
    let hook = get_or_404(state, id)?;
    Ok(state.notifier.test(&hook).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support;

    fn new_hook(url: &str) -> NewWebhook {
        NewWebhook {
            name: "ops".into(),
            url: url.into(),
            enabled: true,
            events: vec![WebhookEvent::AlertRaised, WebhookEvent::StreamDown],
            headers: HashMap::from([("X-Token".to_string(), "abc".to_string())]),
        }
    }

    #[test]
    fn crud_round_trip() {
        let (_dir, state) = test_support::state();
        let created = webhook_create(&state, new_hook("https://hooks.example.com/a")).unwrap();
        assert_eq!(webhook_list(&state).unwrap(), vec![created.clone()]);
        assert_eq!(state.notifier.subscribers(WebhookEvent::AlertRaised).len(), 1);
        assert!(state.notifier.subscribers(WebhookEvent::StreamUp).is_empty());

        let updated = webhook_update(
            &state,
            &created.id,
            WebhookPatch {
                enabled: Some(false),
                ..WebhookPatch::default()
            },
        )
        .unwrap();
        assert!(!updated.enabled);
        assert_eq!(updated.headers.get("X-Token").map(String::as_str), Some("abc"));
        assert!(state.notifier.subscribers(WebhookEvent::AlertRaised).is_empty());

        webhook_delete(&state, &created.id).unwrap();
        assert!(webhook_list(&state).unwrap().is_empty());
        assert_eq!(webhook_delete(&state, &created.id).unwrap_err().status(), 404);
    }

    #[test]
    fn invalid_payloads_are_rejected() {
        let (_dir, state) = test_support::state();
        assert_eq!(
            webhook_create(&state, new_hook("mailto:ops@example.com"))
                .unwrap_err()
                .status(),
            400
        );
        let mut no_events = new_hook("https://hooks.example.com/a");
        no_events.events.clear();
        assert_eq!(webhook_create(&state, no_events).unwrap_err().status(), 400);

        let created = webhook_create(&state, new_hook("https://hooks.example.com/a")).unwrap();
        let bad = WebhookPatch {
            url: Some("ftp://x".into()),
            ..WebhookPatch::default()
        };
        assert_eq!(webhook_update(&state, &created.id, bad).unwrap_err().status(), 400);
        assert_eq!(
            webhook_update(&state, "missing", WebhookPatch::default())
                .unwrap_err()
                .status(),
            404
        );
    }

    #[tokio::test]
    async fn test_delivery_reports_failure() {
        let (_dir, state) = test_support::state();
        let created = webhook_create(&state, new_hook("http://127.0.0.1:9/hook")).unwrap();
        let outcome = webhook_test(&state, &created.id).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(webhook_test(&state, "missing").await.unwrap_err().status(), 404);
    }
}
