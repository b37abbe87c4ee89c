use crate::commands::AppState;
use crate::error::CommandError;
use crate::query::{self, AlertList};
use crate::types::alert::Alert;

pub fn alerts_list(
    state: &AppState,
    stream_id: &str,
    include_resolved: bool,
) -> Result<AlertList, CommandError> {
    let view = state.registry.view(stream_id)?;
    Ok(query::alerts(&view, include_resolved))
}

/// Idempotent; acknowledging a resolved alert is a conflict.
pub async fn alert_acknowledge(
    state: &AppState,
    stream_id: &str,
    alert_id: &str,
) -> Result<Alert, CommandError> {
    Ok(state.registry.acknowledge(stream_id, alert_id).await?)
}

pub async fn alert_resolve(
    state: &AppState,
    stream_id: &str,
    alert_id: &str,
) -> Result<Alert, CommandError> {
    Ok(state.registry.resolve(stream_id, alert_id).await?)
}
