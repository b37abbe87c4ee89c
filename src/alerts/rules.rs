//! Alert rules. Each rule looks at one cycle's inputs and reports whether
//! its condition holds; lifecycle handling lives in the engine.

use crate::features::FeatureSummary;
use crate::types::alert::{AlertMetadata, AlertType, Severity};
use crate::types::config::AlertThresholds;
use crate::types::conformance::{ConformanceCounters, FaultCategory};

/// A rule whose condition currently holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub severity: Severity,
    pub message: String,
    pub metadata: AlertMetadata,
}

/// Outcome of evaluating one alert type in one cycle. `trigger == None`
/// counts as a clear cycle for that type.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub alert_type: AlertType,
    pub trigger: Option<Trigger>,
}

impl Finding {
    pub fn clear(alert_type: AlertType) -> Self {
        Self {
            alert_type,
            trigger: None,
        }
    }

    pub fn raised(alert_type: AlertType, trigger: Trigger) -> Self {
        Self {
            alert_type,
            trigger: Some(trigger),
        }
    }
}

pub struct RuleInput<'a> {
    pub counters: &'a ConformanceCounters,
    pub features: &'a FeatureSummary,
    pub error_rate_percent: f64,
    pub consecutive_manifest_failures: u32,
    pub last_manifest_error: Option<&'a str>,
    /// `None` while the stream has not been running long enough to be stale.
    pub seconds_since_data: Option<i64>,
}

/// Every rule except the health bands, which need the finished score.
pub fn evaluate(input: &RuleInput<'_>, t: &AlertThresholds) -> Vec<Finding> {
    let mut findings = vec![error_rate(input.error_rate_percent, t)];
    findings.extend(FaultCategory::ALL.iter().map(|c| fault(input.counters, *c, t)));
    findings.push(ttfb(input.features, t));
    findings.push(download_ratio(input.features, t));
    findings.push(loudness(input.features));
    findings.push(bitrate(input.features, t));
    findings.push(manifest(input, t));
    findings.push(staleness(input, t));
    findings.push(variant_lost(input.features));
    findings
}

pub fn health_band(score: u8, t: &AlertThresholds) -> Vec<Finding> {
    let critical = if score < t.health_critical {
        Finding::raised(
            AlertType::HealthCritical,
            Trigger {
                severity: Severity::Critical,
                message: format!("Health score critical: {score}"),
                metadata: AlertMetadata::HealthScore {
                    score,
                    threshold: t.health_critical,
                },
            },
        )
    } else {
        Finding::clear(AlertType::HealthCritical)
    };
    // Only one band alert is meaningful at a time.
    let degraded = if score < t.health_degraded && score >= t.health_critical {
        Finding::raised(
            AlertType::HealthDegraded,
            Trigger {
                severity: Severity::Warning,
                message: format!("Health score degraded: {score}"),
                metadata: AlertMetadata::HealthScore {
                    score,
                    threshold: t.health_degraded,
                },
            },
        )
    } else {
        Finding::clear(AlertType::HealthDegraded)
    };
    vec![critical, degraded]
}

fn error_rate(rate: f64, t: &AlertThresholds) -> Finding {
    let severity = if rate >= t.error_rate_error {
        Severity::Error
    } else if rate >= t.error_rate_warning {
        Severity::Warning
    } else {
        return Finding::clear(AlertType::HighErrorRate);
    };
    let threshold = if severity == Severity::Error {
        t.error_rate_error
    } else {
        t.error_rate_warning
    };
    Finding::raised(
        AlertType::HighErrorRate,
        Trigger {
            severity,
            message: format!("Segment error rate {rate:.2}% in the last hour"),
            metadata: AlertMetadata::ErrorRate {
                rate_percent: rate,
                threshold,
            },
        },
    )
}

fn fault(counters: &ConformanceCounters, category: FaultCategory, t: &AlertThresholds) -> Finding {
    let alert_type = AlertType::for_fault(category);
    let count = counters.get(category);
    // (warning threshold, error threshold); zero disables a level.
    let (warn_at, error_at) = match category {
        FaultCategory::Sync => (0, t.sync_error),
        FaultCategory::Continuity => (t.continuity_warning, t.continuity_error),
        FaultCategory::Transport => (t.transport_warning, t.transport_error),
        FaultCategory::Pid => (t.pid_warning, 0),
        FaultCategory::Pcr => (t.pcr_warning, 0),
    };
    let (severity, threshold) = if error_at > 0 && count >= error_at {
        (Severity::Error, error_at)
    } else if warn_at > 0 && count >= warn_at {
        (Severity::Warning, warn_at)
    } else {
        return Finding::clear(alert_type);
    };
    Finding::raised(
        alert_type,
        Trigger {
            severity,
            message: format!("{count} {} errors in conformance window", category.as_str()),
            metadata: AlertMetadata::FaultCount {
                category,
                count,
                threshold,
            },
        },
    )
}

fn ttfb(features: &FeatureSummary, t: &AlertThresholds) -> Finding {
    let Some(delivery) = &features.delivery else {
        return Finding::clear(AlertType::HighTtfb);
    };
    let avg = delivery.avg_ttfb_ms;
    let (severity, threshold) = if avg >= t.ttfb_error_ms {
        (Severity::Error, t.ttfb_error_ms)
    } else if avg >= t.ttfb_warning_ms {
        (Severity::Warning, t.ttfb_warning_ms)
    } else {
        return Finding::clear(AlertType::HighTtfb);
    };
    Finding::raised(
        AlertType::HighTtfb,
        Trigger {
            severity,
            message: format!("High time to first byte: {avg:.0} ms"),
            metadata: AlertMetadata::Latency {
                avg_ttfb_ms: avg,
                threshold_ms: threshold,
            },
        },
    )
}

fn download_ratio(features: &FeatureSummary, t: &AlertThresholds) -> Finding {
    let Some(delivery) = &features.delivery else {
        return Finding::clear(AlertType::SlowDownload);
    };
    let ratio = delivery.download_ratio;
    let (severity, threshold) = if ratio <= t.download_ratio_error {
        (Severity::Error, t.download_ratio_error)
    } else if ratio <= t.download_ratio_warning {
        (Severity::Warning, t.download_ratio_warning)
    } else {
        return Finding::clear(AlertType::SlowDownload);
    };
    Finding::raised(
        AlertType::SlowDownload,
        Trigger {
            severity,
            message: format!("Segments download slower than real time (ratio {ratio:.2})"),
            metadata: AlertMetadata::DownloadRatio { ratio, threshold },
        },
    )
}

fn loudness(features: &FeatureSummary) -> Finding {
    let assessment = &features.loudness;
    match (assessment.status.is_out_of_range(), assessment.average) {
        (true, Some(average)) => Finding::raised(
            AlertType::LoudnessOutOfRange,
            Trigger {
                severity: Severity::Warning,
                message: format!(
                    "Audio {}: {average:.1} {}",
                    assessment.status.label(),
                    if assessment.approximated { "dB RMS" } else { "LUFS" }
                ),
                metadata: AlertMetadata::Loudness {
                    status: assessment.status,
                    average,
                    approximated: assessment.approximated,
                },
            },
        ),
        _ => Finding::clear(AlertType::LoudnessOutOfRange),
    }
}

fn bitrate(features: &FeatureSummary, t: &AlertThresholds) -> Finding {
    match &features.bitrate {
        Some(b) if t.bitrate_deviation > 0.0 && b.deviation > t.bitrate_deviation => {
            Finding::raised(
                AlertType::BitrateAnomaly,
                Trigger {
                    severity: Severity::Warning,
                    message: format!(
                        "Actual bitrate {:.2} Mbps deviates {:.0}% from declared {:.2} Mbps",
                        b.actual_mbps,
                        b.deviation * 100.0,
                        b.declared_mbps
                    ),
                    metadata: AlertMetadata::Bitrate {
                        declared_mbps: b.declared_mbps,
                        actual_mbps: b.actual_mbps,
                        deviation: b.deviation,
                        threshold: t.bitrate_deviation,
                    },
                },
            )
        }
        _ => Finding::clear(AlertType::BitrateAnomaly),
    }
}

fn manifest(input: &RuleInput<'_>, t: &AlertThresholds) -> Finding {
    let failures = input.consecutive_manifest_failures;
    if t.manifest_failures == 0 || failures < t.manifest_failures {
        return Finding::clear(AlertType::ManifestUnreachable);
    }
    Finding::raised(
        AlertType::ManifestUnreachable,
        Trigger {
            severity: Severity::Critical,
            message: format!("Manifest unreachable after {failures} consecutive attempts"),
            metadata: AlertMetadata::ManifestFailures {
                consecutive: failures,
                threshold: t.manifest_failures,
                last_error: input.last_manifest_error.map(str::to_string),
            },
        },
    )
}

fn staleness(input: &RuleInput<'_>, t: &AlertThresholds) -> Finding {
    match input.seconds_since_data {
        Some(secs) if secs >= t.stale_after_secs => Finding::raised(
            AlertType::StaleData,
            Trigger {
                severity: Severity::Error,
                message: format!("No new segments for {secs} s"),
                metadata: AlertMetadata::Staleness {
                    seconds_since_data: secs,
                    threshold_secs: t.stale_after_secs,
                },
            },
        ),
        _ => Finding::clear(AlertType::StaleData),
    }
}

fn variant_lost(features: &FeatureSummary) -> Finding {
    match &features.variant_drop {
        Some(drop) => Finding::raised(
            AlertType::VariantLost,
            Trigger {
                severity: Severity::Warning,
                message: format!(
                    "Variant count dropped from {} to {}",
                    drop.previous, drop.current
                ),
                metadata: AlertMetadata::VariantCount {
                    previous: drop.previous,
                    current: drop.current,
                },
            },
        ),
        None => Finding::clear(AlertType::VariantLost),
    }
}
