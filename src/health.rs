//! Health scoring: a 0-100 score built from penalties, plus uptime and
//! error-rate figures over the fetch history.

use chrono::{DateTime, Duration, Utc};

use crate::features::delivery::DeliveryStats;
use crate::types::alert::{Alert, Severity};
use crate::types::config::ScoringWeights;
use crate::types::conformance::{ConformanceCounters, FaultCategory};
use crate::types::health::{HealthColor, HealthScore, ScoreFactor};
use crate::types::telemetry::{FetchOutcome, FetchTarget};

pub struct HealthInputs<'a> {
    pub counters: &'a ConformanceCounters,
    /// Percent of failed segment fetches in the last hour.
    pub error_rate_percent: f64,
    pub delivery: Option<&'a DeliveryStats>,
    pub active_alerts: &'a [Alert],
}

#[derive(Debug, Clone)]
pub struct HealthScorer {
    weights: ScoringWeights,
}

impl HealthScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn set_weights(&mut self, weights: ScoringWeights) {
        self.weights = weights;
    }

    pub fn score(&self, inputs: &HealthInputs<'_>) -> HealthScore {
        let w = &self.weights;
        let mut factors = Vec::new();

        for category in FaultCategory::ALL {
            let count = inputs.counters.get(category);
            let rule = match category {
                FaultCategory::Sync => w.sync,
                FaultCategory::Continuity => w.continuity,
                FaultCategory::Transport => w.transport,
                FaultCategory::Pid => w.pid,
                FaultCategory::Pcr => w.pcr,
            };
            push_factor(
                &mut factors,
                &format!("{}_errors", category.as_str()),
                rule.apply(f64::from(count)),
                format!("{count} in window"),
            );
        }

        push_factor(
            &mut factors,
            "error_rate",
            w.error_rate.apply(inputs.error_rate_percent),
            format!("{:.2}% failed segment fetches", inputs.error_rate_percent),
        );

        if let Some(delivery) = inputs.delivery {
            let over = delivery.avg_ttfb_ms - w.ttfb_threshold_ms;
            push_factor(
                &mut factors,
                "ttfb",
                w.ttfb.apply(over / 100.0),
                format!("avg {:.0} ms", delivery.avg_ttfb_ms),
            );
            push_factor(
                &mut factors,
                "download_ratio",
                w.download_ratio.apply(1.0 - delivery.download_ratio),
                format!("ratio {:.2}", delivery.download_ratio),
            );
        }

        let alert_penalty: f64 = inputs
            .active_alerts
            .iter()
            .filter(|a| a.is_open() && !a.alert_type.is_health_band())
            .map(|a| match a.severity {
                Severity::Info => w.alert_info,
                Severity::Warning => w.alert_warning,
                Severity::Error => w.alert_error,
                Severity::Critical => w.alert_critical,
            })
            .sum();
        let open = inputs
            .active_alerts
            .iter()
            .filter(|a| a.is_open() && !a.alert_type.is_health_band())
            .count();
        push_factor(
            &mut factors,
            "active_alerts",
            alert_penalty.min(w.alert_cap),
            format!("{open} open"),
        );

        let total: f64 = factors.iter().map(|f| f.penalty).sum();
        let value = (100.0 - total).round().clamp(0.0, 100.0) as u8;
        HealthScore {
            value,
            color: HealthColor::from_score(value),
            factors,
        }
    }
}

fn push_factor(factors: &mut Vec<ScoreFactor>, name: &str, penalty: f64, detail: String) {
    if penalty.is_finite() && penalty > 0.0 {
        factors.push(ScoreFactor {
            name: name.to_string(),
            penalty,
            detail,
        });
    }
}

/// Percent of successful fetch attempts (any target) since `now - window`.
/// 100 when there were no attempts.
pub fn uptime_percentage<'a>(
    fetches: impl Iterator<Item = &'a FetchOutcome>,
    now: DateTime<Utc>,
    window: Duration,
) -> f64 {
    let since = now - window;
    let (ok, total) = fetches
        .filter(|f| f.timestamp >= since && f.timestamp <= now)
        .fold((0u64, 0u64), |(ok, total), f| {
            (ok + u64::from(f.success), total + 1)
        });
    if total == 0 {
        return 100.0;
    }
    ok as f64 / total as f64 * 100.0
}

/// Percent of failed segment fetches in the hour before `now`.
pub fn error_rate_last_hour<'a>(
    fetches: impl Iterator<Item = &'a FetchOutcome>,
    now: DateTime<Utc>,
) -> f64 {
    let since = now - Duration::hours(1);
    let (failed, total) = fetches
        .filter(|f| f.target == FetchTarget::Segment && f.timestamp >= since && f.timestamp <= now)
        .fold((0u64, 0u64), |(failed, total), f| {
            (failed + u64::from(!f.success), total + 1)
        });
    if total == 0 {
        return 0.0;
    }
    failed as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::alert::{AlertMetadata, AlertType};

    fn counters() -> ConformanceCounters {
        ConformanceCounters::new("s1", Utc::now())
    }

    fn alert(alert_type: AlertType, severity: Severity) -> Alert {
        let now = Utc::now();
        Alert {
            alert_id: format!("s1:{}:1", alert_type.as_str()),
            stream_id: "s1".into(),
            alert_type,
            severity,
            message: String::new(),
            timestamp: now,
            last_triggered_at: now,
            metadata: AlertMetadata::Internal {
                message: String::new(),
            },
            acknowledged: false,
            resolved: false,
            resolved_at: None,
        }
    }

    fn inputs<'a>(c: &'a ConformanceCounters, alerts: &'a [Alert]) -> HealthInputs<'a> {
        HealthInputs {
            counters: c,
            error_rate_percent: 0.0,
            delivery: None,
            active_alerts: alerts,
        }
    }

    #[test]
    fn clean_stream_scores_exactly_100() {
        let scorer = HealthScorer::new(ScoringWeights::default());
        let c = counters();
        let score = scorer.score(&inputs(&c, &[]));
        assert_eq!(score.value, 100);
        assert_eq!(score.color, HealthColor::Green);
        assert!(score.factors.is_empty());
    }

    #[test]
    fn sync_errors_lower_the_score() {
        let scorer = HealthScorer::new(ScoringWeights::default());
        let mut c = counters();
        c.sync_byte_errors = 2;
        let score = scorer.score(&inputs(&c, &[]));
        assert!(score.value < 100);
        assert_eq!(score.value, 90);
        assert_eq!(score.factors[0].name, "sync_errors");
    }

    #[test]
    fn penalties_are_capped_and_score_clamped() {
        let scorer = HealthScorer::new(ScoringWeights::default());
        let mut c = counters();
        c.sync_byte_errors = 1000;
        c.continuity_errors = 1000;
        c.transport_errors = 1000;
        c.pid_errors = 1000;
        c.pcr_errors = 1000;
        let alerts: Vec<Alert> = (0..20)
            .map(|_| alert(AlertType::InternalError, Severity::Critical))
            .collect();
        let mut i = inputs(&c, &alerts);
        i.error_rate_percent = 100.0;
        let stats = DeliveryStats {
            samples: 20,
            avg_ttfb_ms: 10_000.0,
            download_ratio: 0.0,
            avg_bitrate_mbps: 1.0,
            avg_download_speed_mbps: 0.0,
        };
        i.delivery = Some(&stats);
        let score = scorer.score(&i);
        assert_eq!(score.value, 0);
        assert_eq!(score.color, HealthColor::Red);
        let sync = score.factors.iter().find(|f| f.name == "sync_errors").unwrap();
        assert_eq!(sync.penalty, 25.0);
    }

    #[test]
    fn alerts_weigh_by_severity_excluding_health_band() {
        let scorer = HealthScorer::new(ScoringWeights::default());
        let c = counters();
        let critical = [alert(AlertType::StaleData, Severity::Critical)];
        let warning = [alert(AlertType::HighTtfb, Severity::Warning)];
        let band = [alert(AlertType::HealthCritical, Severity::Critical)];
        let crit_score = scorer.score(&inputs(&c, &critical)).value;
        let warn_score = scorer.score(&inputs(&c, &warning)).value;
        assert!(crit_score < warn_score);
        assert_eq!(scorer.score(&inputs(&c, &band)).value, 100);
    }

    #[test]
    fn error_rate_counts_only_segment_fetches() {
        let now = Utc::now();
        let outcome = |secs: i64, target, success| FetchOutcome {
            timestamp: now - Duration::seconds(secs),
            target,
            success,
            message: None,
        };
        let fetches = vec![
            outcome(10, FetchTarget::Segment, true),
            outcome(20, FetchTarget::Segment, false),
            outcome(30, FetchTarget::Manifest, false),
            outcome(40, FetchTarget::Segment, true),
            outcome(50, FetchTarget::Segment, true),
            outcome(7200, FetchTarget::Segment, false),
        ];
        assert_eq!(error_rate_last_hour(fetches.iter(), now), 25.0);
        let uptime = uptime_percentage(fetches.iter(), now, Duration::hours(24));
        assert!((uptime - 50.0).abs() < 1e-9);
    }

    #[test]
    fn no_fetches_means_full_uptime() {
        let now = Utc::now();
        assert_eq!(uptime_percentage(std::iter::empty(), now, Duration::hours(24)), 100.0);
        assert_eq!(error_rate_last_hour(std::iter::empty(), now), 0.0);
    }
}
