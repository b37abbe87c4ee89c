use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conformance::FaultCategory;
use super::loudness::LoudnessStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HealthDegraded,
    HealthCritical,
    HighErrorRate,
    ContinuityErrors,
    SyncErrors,
    TransportErrors,
    PidErrors,
    PcrErrors,
    HighTtfb,
    SlowDownload,
    LoudnessOutOfRange,
    BitrateAnomaly,
    ManifestUnreachable,
    StaleData,
    VariantLost,
    InternalError,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::HealthDegraded => "health_degraded",
            AlertType::HealthCritical => "health_critical",
            AlertType::HighErrorRate => "high_error_rate",
            AlertType::ContinuityErrors => "continuity_errors",
            AlertType::SyncErrors => "sync_errors",
            AlertType::TransportErrors => "transport_errors",
            AlertType::PidErrors => "pid_errors",
            AlertType::PcrErrors => "pcr_errors",
            AlertType::HighTtfb => "high_ttfb",
            AlertType::SlowDownload => "slow_download",
            AlertType::LoudnessOutOfRange => "loudness_out_of_range",
            AlertType::BitrateAnomaly => "bitrate_anomaly",
            AlertType::ManifestUnreachable => "manifest_unreachable",
            AlertType::StaleData => "stale_data",
            AlertType::VariantLost => "variant_lost",
            AlertType::InternalError => "internal_error",
        }
    }

    /// Alerts derived from the health score itself. They never feed back
    /// into the score.
    pub fn is_health_band(&self) -> bool {
        matches!(self, AlertType::HealthDegraded | AlertType::HealthCritical)
    }

    pub fn for_fault(category: FaultCategory) -> AlertType {
        match category {
            FaultCategory::Sync => AlertType::SyncErrors,
            FaultCategory::Continuity => AlertType::ContinuityErrors,
            FaultCategory::Transport => AlertType::TransportErrors,
            FaultCategory::Pid => AlertType::PidErrors,
            FaultCategory::Pcr => AlertType::PcrErrors,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Open,
    Acknowledged,
    Resolved,
}

/// Typed context carried by each alert kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertMetadata {
    HealthScore {
        score: u8,
        threshold: u8,
    },
    ErrorRate {
        rate_percent: f64,
        threshold: f64,
    },
    FaultCount {
        category: FaultCategory,
        count: u32,
        threshold: u32,
    },
    Latency {
        avg_ttfb_ms: f64,
        threshold_ms: f64,
    },
    DownloadRatio {
        ratio: f64,
        threshold: f64,
    },
    Loudness {
        status: LoudnessStatus,
        average: f64,
        approximated: bool,
    },
    Bitrate {
        declared_mbps: f64,
        actual_mbps: f64,
        deviation: f64,
        threshold: f64,
    },
    ManifestFailures {
        consecutive: u32,
        threshold: u32,
        last_error: Option<String>,
    },
    Staleness {
        seconds_since_data: i64,
        threshold_secs: i64,
    },
    VariantCount {
        previous: u32,
        current: u32,
    },
    Internal {
        message: String,
    },
}

impl AlertMetadata {
    pub fn threshold_value(&self) -> Option<String> {
        match self {
            AlertMetadata::HealthScore { threshold, .. } => Some(threshold.to_string()),
            AlertMetadata::ErrorRate { threshold, .. } => Some(threshold.to_string()),
            AlertMetadata::FaultCount { threshold, .. } => Some(threshold.to_string()),
            AlertMetadata::Latency { threshold_ms, .. } => Some(threshold_ms.to_string()),
            AlertMetadata::DownloadRatio { threshold, .. } => Some(threshold.to_string()),
            AlertMetadata::Bitrate { threshold, .. } => Some(threshold.to_string()),
            AlertMetadata::ManifestFailures { threshold, .. } => Some(threshold.to_string()),
            AlertMetadata::Staleness { threshold_secs, .. } => Some(threshold_secs.to_string()),
            AlertMetadata::Loudness { .. }
            | AlertMetadata::VariantCount { .. }
            | AlertMetadata::Internal { .. } => None,
        }
    }

    pub fn actual_value(&self) -> Option<String> {
        match self {
            AlertMetadata::HealthScore { score, .. } => Some(score.to_string()),
            AlertMetadata::ErrorRate { rate_percent, .. } => Some(format!("{rate_percent:.2}")),
            AlertMetadata::FaultCount { count, .. } => Some(count.to_string()),
            AlertMetadata::Latency { avg_ttfb_ms, .. } => Some(format!("{avg_ttfb_ms:.1}")),
            AlertMetadata::DownloadRatio { ratio, .. } => Some(format!("{ratio:.2}")),
            AlertMetadata::Loudness { average, .. } => Some(format!("{average:.1}")),
            AlertMetadata::Bitrate { actual_mbps, .. } => Some(format!("{actual_mbps:.3}")),
            AlertMetadata::ManifestFailures { consecutive, .. } => Some(consecutive.to_string()),
            AlertMetadata::Staleness {
                seconds_since_data, ..
            } => Some(seconds_since_data.to_string()),
            AlertMetadata::VariantCount { current, .. } => Some(current.to_string()),
            AlertMetadata::Internal { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub stream_id: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    /// First observation of the condition.
    pub timestamp: DateTime<Utc>,
    pub last_triggered_at: DateTime<Utc>,
    pub metadata: AlertMetadata,
    pub acknowledged: bool,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn state(&self) -> AlertState {
        if self.resolved {
            AlertState::Resolved
        } else if self.acknowledged {
            AlertState::Acknowledged
        } else {
            AlertState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        !self.resolved
    }
}
