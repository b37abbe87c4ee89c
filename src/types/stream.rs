use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::health::HealthSnapshot;
use super::loudness::LoudnessStatus;
use super::segment::SegmentMetric;

/// A monitored stream definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub id: String,
    pub name: String,
    pub manifest_url: String,
    pub enabled: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for registering a stream. A missing id is generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStream {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub manifest_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub stream: StreamConfig,
    pub current_metrics: Option<SegmentMetric>,
    pub health: HealthSnapshot,
    pub loudness_status: LoudnessStatus,
    pub ad_marker_count: usize,
    pub open_alert_count: usize,
}
