use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::ad::AdMarker;
use crate::types::alert::Alert;
use crate::types::health::HealthSnapshot;
use crate::types::loudness::LoudnessSample;
use crate::types::segment::SegmentMetric;

/// Push message type names as they appear on the wire.
pub mod event_names {
    pub const CONNECTED: &str = "connected";
    pub const PONG: &str = "pong";
    pub const SEGMENT_DOWNLOADED: &str = "segment_downloaded";
    pub const LOUDNESS_DATA: &str = "loudness_data";
    pub const AD_DETECTED: &str = "ad_detected";
    pub const ERROR: &str = "error";
    pub const HEALTH_UPDATE: &str = "health_update";
    pub const ALERT_RAISED: &str = "alert_raised";
    pub const ALERT_RESOLVED: &str = "alert_resolved";
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushPayload {
    Connected { health: HealthSnapshot },
    Pong,
    SegmentDownloaded(SegmentMetric),
    LoudnessData(LoudnessSample),
    AdDetected(AdMarker),
    Error { message: String },
    HealthUpdate(HealthSnapshot),
    AlertRaised(Alert),
    AlertResolved(Alert),
}

impl PushPayload {
    pub fn name(&self) -> &'static str {
        use event_names::*;
        match self {
            PushPayload::Connected { .. } => CONNECTED,
            PushPayload::Pong => PONG,
            PushPayload::SegmentDownloaded(_) => SEGMENT_DOWNLOADED,
            PushPayload::LoudnessData(_) => LOUDNESS_DATA,
            PushPayload::AdDetected(_) => AD_DETECTED,
            PushPayload::Error { .. } => ERROR,
            PushPayload::HealthUpdate(_) => HEALTH_UPDATE,
            PushPayload::AlertRaised(_) => ALERT_RAISED,
            PushPayload::AlertResolved(_) => ALERT_RESOLVED,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub stream_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: PushPayload,
}

impl PushMessage {
    pub fn new(stream_id: &str, payload: PushPayload) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| e.to_string())
    }
}

/// Sends to current subscribers. Returns how many received it; having none
/// is not an error.
pub fn emit_event(channel: &broadcast::Sender<PushMessage>, message: PushMessage) -> usize {
    channel.send(message).unwrap_or(0)
}
