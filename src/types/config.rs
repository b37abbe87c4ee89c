use serde::{Deserialize, Serialize};

/// Full monitor configuration. Every field has a default so a partial JSON
/// document (or `{}`) deserializes into a usable config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub tick_interval_secs: u64,
    pub queue_capacity: usize,
    pub ingest: IngestConfig,
    pub conformance: ConformanceConfig,
    pub loudness: LoudnessConfig,
    pub delivery: DeliveryConfig,
    pub scoring: ScoringWeights,
    pub alerts: AlertThresholds,
    pub webhooks: RetryPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            queue_capacity: 1024,
            ingest: IngestConfig::default(),
            conformance: ConformanceConfig::default(),
            loudness: LoudnessConfig::default(),
            delivery: DeliveryConfig::default(),
            scoring: ScoringWeights::default(),
            alerts: AlertThresholds::default(),
            webhooks: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub retention_secs: i64,
    /// How far an event may lag behind the newest one in its series.
    pub backdate_tolerance_ms: i64,
    /// Entries per sealed chunk.
    pub chunk_len: usize,
    /// Fetch outcomes are only needed for the 24 h uptime window.
    pub fetch_retention_secs: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            retention_secs: 4 * 24 * 3600,
            backdate_tolerance_ms: 2000,
            chunk_len: 256,
            fetch_retention_secs: 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConformanceConfig {
    pub window_secs: i64,
}

impl Default for ConformanceConfig {
    fn default() -> Self {
        Self { window_secs: 180 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessConfig {
    pub sample_window: usize,
    pub target_lufs: f64,
    pub lufs_too_loud: f64,
    pub lufs_too_quiet: f64,
    pub rms_too_loud: f64,
    pub rms_too_quiet: f64,
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self {
            sample_window: 10,
            target_lufs: -23.0,
            lufs_too_loud: -14.0,
            lufs_too_quiet: -27.0,
            rms_too_loud: -4.0,
            rms_too_quiet: -17.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Segments averaged for TTFB and download ratio.
    pub sample_window: usize,
    pub max_download_ratio: f64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            sample_window: 20,
            max_download_ratio: 2.0,
        }
    }
}

/// `min(cap, per_unit * amount)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyRule {
    pub per_unit: f64,
    pub cap: f64,
}

impl PenaltyRule {
    pub const fn new(per_unit: f64, cap: f64) -> Self {
        Self { per_unit, cap }
    }

    pub fn apply(&self, amount: f64) -> f64 {
        if amount <= 0.0 {
            return 0.0;
        }
        (self.per_unit * amount).min(self.cap)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub sync: PenaltyRule,
    pub continuity: PenaltyRule,
    pub transport: PenaltyRule,
    pub pid: PenaltyRule,
    pub pcr: PenaltyRule,
    /// Applied per percent of failed segment fetches.
    pub error_rate: PenaltyRule,
    pub ttfb_threshold_ms: f64,
    /// Applied per 100 ms above the threshold.
    pub ttfb: PenaltyRule,
    /// Applied to `1 - ratio` when the download ratio is below 1.
    pub download_ratio: PenaltyRule,
    pub alert_info: f64,
    pub alert_warning: f64,
    pub alert_error: f64,
    pub alert_critical: f64,
    pub alert_cap: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            sync: PenaltyRule::new(5.0, 25.0),
            continuity: PenaltyRule::new(2.0, 20.0),
            transport: PenaltyRule::new(3.0, 15.0),
            pid: PenaltyRule::new(2.0, 10.0),
            pcr: PenaltyRule::new(2.0, 10.0),
            error_rate: PenaltyRule::new(10.0, 30.0),
            ttfb_threshold_ms: 500.0,
            ttfb: PenaltyRule::new(1.0, 10.0),
            download_ratio: PenaltyRule::new(30.0, 15.0),
            alert_info: 1.0,
            alert_warning: 3.0,
            alert_error: 6.0,
            alert_critical: 10.0,
            alert_cap: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub health_degraded: u8,
    pub health_critical: u8,
    pub error_rate_warning: f64,
    pub error_rate_error: f64,
    pub continuity_warning: u32,
    pub continuity_error: u32,
    pub sync_error: u32,
    pub transport_warning: u32,
    pub transport_error: u32,
    pub pid_warning: u32,
    pub pcr_warning: u32,
    pub ttfb_warning_ms: f64,
    pub ttfb_error_ms: f64,
    pub download_ratio_warning: f64,
    pub download_ratio_error: f64,
    /// Relative deviation of actual bitrate from declared bandwidth.
    pub bitrate_deviation: f64,
    pub manifest_failures: u32,
    pub stale_after_secs: i64,
    /// Consecutive clear evaluations before an alert auto-resolves.
    pub resolve_after_cycles: u32,
    /// Time without a trigger before an alert auto-resolves.
    pub resolve_cooldown_secs: i64,
    pub history_retention_secs: i64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            health_degraded: 60,
            health_critical: 40,
            error_rate_warning: 1.0,
            error_rate_error: 5.0,
            continuity_warning: 5,
            continuity_error: 20,
            sync_error: 1,
            transport_warning: 1,
            transport_error: 10,
            pid_warning: 1,
            pcr_warning: 1,
            ttfb_warning_ms: 500.0,
            ttfb_error_ms: 1000.0,
            download_ratio_warning: 0.8,
            download_ratio_error: 0.5,
            bitrate_deviation: 0.5,
            manifest_failures: 3,
            stale_after_secs: 30,
            resolve_after_cycles: 3,
            resolve_cooldown_secs: 60,
            history_retention_secs: 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            timeout_secs: 10,
        }
    }
}
