use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::Alert;
use super::conformance::ConformanceCounters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Starting,
    Online,
    Offline,
    Error,
    /// Configured but not monitored; no staleness or fetch checks apply.
    Disabled,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Starting => "starting",
            StreamStatus::Online => "online",
            StreamStatus::Offline => "offline",
            StreamStatus::Error => "error",
            StreamStatus::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthColor {
    Green,
    Yellow,
    Red,
}

impl HealthColor {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => HealthColor::Green,
            50..=79 => HealthColor::Yellow,
            _ => HealthColor::Red,
        }
    }

    pub fn band(&self) -> &'static str {
        match self {
            HealthColor::Green => "healthy",
            HealthColor::Yellow => "degraded",
            HealthColor::Red => "critical",
        }
    }
}

/// One penalty applied to the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactor {
    pub name: String,
    pub penalty: f64,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub value: u8,
    pub color: HealthColor,
    pub factors: Vec<ScoreFactor>,
}

impl HealthScore {
    pub fn perfect() -> Self {
        Self {
            value: 100,
            color: HealthColor::Green,
            factors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub stream_id: String,
    pub status: StreamStatus,
    pub health_score: HealthScore,
    pub uptime_percentage: f64,
    pub error_rate_last_hour: f64,
    pub tr_conformance: ConformanceCounters,
    pub active_alerts: Vec<Alert>,
    pub last_updated: DateTime<Utc>,
}

impl HealthSnapshot {
    pub fn initial(stream_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            status: StreamStatus::Starting,
            health_score: HealthScore::perfect(),
            uptime_percentage: 100.0,
            error_rate_last_hour: 0.0,
            tr_conformance: ConformanceCounters::new(stream_id, now),
            active_alerts: Vec::new(),
            last_updated: now,
        }
    }
}
