//! Synchronous pipeline for one stream: ingest, conformance, features,
//! alerts, health. Owned by exactly one worker task.

use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error};

use crate::alerts::rules::{self, Finding, RuleInput, Trigger};
use crate::alerts::{AlertEngine, AlertTransition};
use crate::conformance::ConformanceAnalyzer;
use crate::error::{AlertError, EvaluationError, IngestError};
use crate::events::PushPayload;
use crate::features::{FeatureExtractor, FeatureSummary};
use crate::health::{self, HealthInputs, HealthScorer};
use crate::ingest::{Accepted, IngestBuffer, SeriesSnapshot};
use crate::types::ad::AdMarker;
use crate::types::alert::{Alert, AlertMetadata, AlertType, Severity};
use crate::types::config::MonitorConfig;
use crate::types::health::{HealthSnapshot, StreamStatus};
use crate::types::loudness::LoudnessSample;
use crate::types::segment::SegmentMetric;
use crate::types::stream::{StreamConfig, StreamSummary};
use crate::types::telemetry::{FetchTarget, TelemetryEvent};

/// Immutable published state of a stream. Readers hold it through an `Arc`.
#[derive(Debug, Clone)]
pub struct StreamView {
    pub stream: StreamConfig,
    pub health: HealthSnapshot,
    pub features: FeatureSummary,
    pub segments: SeriesSnapshot<SegmentMetric>,
    pub loudness: SeriesSnapshot<LoudnessSample>,
    pub ad_markers: SeriesSnapshot<AdMarker>,
    /// Open alerts plus resolved history inside the retention window.
    pub alerts: Vec<Alert>,
    pub rejected_events: u64,
}

impl StreamView {
    pub fn summary(&self) -> StreamSummary {
        StreamSummary {
            stream: self.stream.clone(),
            current_metrics: self.segments.last().cloned(),
            health: self.health.clone(),
            loudness_status: self.features.loudness.status,
            ad_marker_count: self.ad_markers.len(),
            open_alert_count: self.alerts.iter().filter(|a| a.is_open()).count(),
        }
    }
}

/// Side effects of one ingest or tick, for the worker to publish.
#[derive(Debug, Default)]
pub struct Outcome {
    pub push: Vec<PushPayload>,
    pub transitions: Vec<AlertTransition>,
    /// `(previous, current)`
    pub status_change: Option<(StreamStatus, StreamStatus)>,
}

pub struct StreamMonitor {
    stream: StreamConfig,
    settings: MonitorConfig,
    buffer: IngestBuffer,
    conformance: ConformanceAnalyzer,
    features: FeatureExtractor,
    alerts: AlertEngine,
    scorer: HealthScorer,
    manifest_failures: u32,
    last_manifest_error: Option<String>,
    started_at: DateTime<Utc>,
    last_segment_at: Option<DateTime<Utc>>,
    summary: FeatureSummary,
    snapshot: HealthSnapshot,
}

impl StreamMonitor {
    pub fn new(stream: StreamConfig, settings: MonitorConfig, now: DateTime<Utc>) -> Self {
        let id = stream.id.clone();
        let features = FeatureExtractor::new();
        let summary = features.summarize(&[], &[], &settings);
        let mut snapshot = HealthSnapshot::initial(&id, now);
        if !stream.enabled {
            snapshot.status = StreamStatus::Disabled;
        }
        Self {
            buffer: IngestBuffer::new(&id, settings.ingest.clone()),
            conformance: ConformanceAnalyzer::new(&id, &settings.conformance, now),
            alerts: AlertEngine::new(&id, &settings.alerts),
            scorer: HealthScorer::new(settings.scoring.clone()),
            features,
            manifest_failures: 0,
            last_manifest_error: None,
            started_at: now,
            last_segment_at: None,
            summary,
            snapshot,
            stream,
            settings,
        }
    }

    pub fn stream(&self) -> &StreamConfig {
        &self.stream
    }

    pub fn snapshot(&self) -> &HealthSnapshot {
        &self.snapshot
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn reconfigure(&mut self, settings: MonitorConfig) {
        self.buffer.reconfigure(settings.ingest.clone());
        self.conformance.reconfigure(&settings.conformance);
        self.alerts.reconfigure(&settings.alerts);
        self.scorer.set_weights(settings.scoring.clone());
        self.settings = settings;
    }

    /// Applies one telemetry event and re-evaluates.
    pub fn ingest(
        &mut self,
        event: TelemetryEvent,
        now: DateTime<Utc>,
    ) -> Result<Outcome, IngestError> {
        let accepted = self.buffer.append(event)?;
        let mut outcome = Outcome::default();

        match accepted {
            Accepted::Segment(metric) => {
                self.features.observe_segment(&metric);
                self.last_segment_at = Some(now);
                outcome.push.push(PushPayload::SegmentDownloaded(metric));
            }
            Accepted::Loudness(sample) => {
                outcome.push.push(PushPayload::LoudnessData(sample));
            }
            Accepted::Signal(signal) => {
                if let Some(marker) = self.features.detect_signal(signal) {
                    self.buffer.record_marker(marker.clone());
                    outcome.push.push(PushPayload::AdDetected(marker));
                }
            }
            Accepted::Fault(fault) => {
                self.conformance.record(&fault);
            }
            Accepted::FetchFailed(failure) => {
                if failure.target == FetchTarget::Manifest {
                    self.manifest_failures += 1;
                    self.last_manifest_error = failure.message.clone();
                }
                let what = match failure.target {
                    FetchTarget::Manifest => "manifest",
                    FetchTarget::Segment => "segment",
                };
                outcome.push.push(PushPayload::Error {
                    message: format!(
                        "{what} fetch failed: {}",
                        failure.message.as_deref().unwrap_or("unknown error")
                    ),
                });
            }
            Accepted::Manifest(update) => {
                self.manifest_failures = 0;
                self.last_manifest_error = None;
                self.features.observe_manifest(&update);
            }
        }

        self.run_cycle(now, &mut outcome);
        Ok(outcome)
    }

    /// Time-driven work: retention, window expiry, staleness, auto-resolve.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Outcome {
        let dropped = self.buffer.prune(now);
        self.features
            .prune(now - Duration::seconds(self.settings.ingest.retention_secs));
        let pruned_alerts = self.alerts.prune(now);
        if dropped > 0 || pruned_alerts > 0 {
            debug!(stream_id = %self.stream.id, dropped, pruned_alerts, "retention applied");
        }
        let mut outcome = Outcome::default();
        self.run_cycle(now, &mut outcome);
        outcome
    }

    pub fn acknowledge(&mut self, alert_id: &str) -> Result<Alert, AlertError> {
        let alert = self.alerts.acknowledge(alert_id)?;
        if let Some(active) = self
            .snapshot
            .active_alerts
            .iter_mut()
            .find(|a| a.alert_id == alert.alert_id)
        {
            active.acknowledged = true;
        }
        Ok(alert)
    }

    /// Manual resolve, followed by a fresh evaluation.
    pub fn resolve(
        &mut self,
        alert_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Alert, Outcome), AlertError> {
        let alert = self.alerts.resolve(alert_id, now)?;
        let mut outcome = Outcome::default();
        outcome
            .transitions
            .push(AlertTransition::Resolved(alert.clone()));
        outcome.push.push(PushPayload::AlertResolved(alert.clone()));
        self.run_cycle(now, &mut outcome);
        Ok((alert, outcome))
    }

    pub fn view(&self) -> StreamView {
        StreamView {
            stream: self.stream.clone(),
            health: self.snapshot.clone(),
            features: self.summary.clone(),
            segments: self.buffer.segments(),
            loudness: self.buffer.loudness(),
            ad_markers: self.buffer.markers(),
            alerts: self.alerts.history().to_vec(),
            rejected_events: self.buffer.rejected(),
        }
    }

    /// Runs one evaluation with errors and panics contained. On failure the
    /// previous snapshot stays published and `internal_error` is raised.
    fn run_cycle(&mut self, now: DateTime<Utc>, outcome: &mut Outcome) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.evaluate(now)))
            .unwrap_or_else(|payload| Err(EvaluationError::Panicked(panic_message(&*payload))));

        match result {
            Ok((transitions, previous_status)) => {
                if previous_status != self.snapshot.status {
                    outcome.status_change = Some((previous_status, self.snapshot.status));
                }
                push_transitions(&transitions, outcome);
                outcome.transitions.extend(transitions);
                outcome
                    .push
                    .push(PushPayload::HealthUpdate(self.snapshot.clone()));
            }
            Err(err) => {
                error!(stream_id = %self.stream.id, error = %err, "evaluation failed, keeping last snapshot");
                let trigger = Trigger {
                    severity: Severity::Critical,
                    message: format!("Evaluation failed: {err}"),
                    metadata: AlertMetadata::Internal {
                        message: err.to_string(),
                    },
                };
                if let Some(alert) = self.alerts.raise(AlertType::InternalError, trigger, now) {
                    let transitions = vec![AlertTransition::Raised(alert)];
                    push_transitions(&transitions, outcome);
                    outcome.transitions.extend(transitions);
                }
                outcome.push.push(PushPayload::Error {
                    message: err.to_string(),
                });
            }
        }
    }

    fn evaluate(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<(Vec<AlertTransition>, StreamStatus), EvaluationError> {
        self.conformance.advance(now);
        let counters = self.conformance.counters().clone();

        let recent_segments = self
            .buffer
            .segments()
            .tail(self.settings.delivery.sample_window.max(1));
        let recent_loudness = self
            .buffer
            .loudness()
            .tail(self.settings.loudness.sample_window.max(1));
        let summary = self
            .features
            .summarize(&recent_segments, &recent_loudness, &self.settings);

        let fetches = self.buffer.fetches();
        let error_rate = health::error_rate_last_hour(fetches.iter(), now);
        let uptime = health::uptime_percentage(fetches.iter(), now, Duration::hours(24));

        ensure_finite("error_rate", error_rate)?;
        ensure_finite("uptime", uptime)?;
        if let Some(delivery) = &summary.delivery {
            ensure_finite("avg_ttfb", delivery.avg_ttfb_ms)?;
            ensure_finite("download_ratio", delivery.download_ratio)?;
        }
        if let Some(bitrate) = &summary.bitrate {
            ensure_finite("bitrate_deviation", bitrate.deviation)?;
        }

        let input = RuleInput {
            counters: &counters,
            features: &summary,
            error_rate_percent: error_rate,
            consecutive_manifest_failures: if self.stream.enabled {
                self.manifest_failures
            } else {
                0
            },
            last_manifest_error: self.last_manifest_error.as_deref(),
            seconds_since_data: self.seconds_since_data(now),
        };
        let mut findings = rules::evaluate(&input, &self.settings.alerts);
        findings.push(Finding::clear(AlertType::InternalError));
        let mut transitions = self.alerts.apply(findings, now);

        let active = self.alerts.active();
        let score = self.scorer.score(&HealthInputs {
            counters: &counters,
            error_rate_percent: error_rate,
            delivery: summary.delivery.as_ref(),
            active_alerts: &active,
        });
        transitions.extend(
            self.alerts
                .apply(rules::health_band(score.value, &self.settings.alerts), now),
        );

        let previous_status = self.snapshot.status;
        self.summary = summary;
        self.snapshot = HealthSnapshot {
            stream_id: self.stream.id.clone(),
            status: self.derive_status(),
            health_score: score,
            uptime_percentage: uptime,
            error_rate_last_hour: error_rate,
            tr_conformance: counters,
            active_alerts: self.alerts.active(),
            last_updated: now,
        };
        Ok((transitions, previous_status))
    }

    /// Staleness only applies to monitored streams. Before the first segment
    /// the stream gets one full `stale_after_secs` from start as grace.
    fn seconds_since_data(&self, now: DateTime<Utc>) -> Option<i64> {
        if !self.stream.enabled {
            return None;
        }
        match self.last_segment_at {
            Some(last) => Some((now - last).num_seconds().max(0)),
            None => {
                let waited = (now - self.started_at).num_seconds().max(0);
                (waited >= self.settings.alerts.stale_after_secs).then_some(waited)
            }
        }
    }

    fn derive_status(&self) -> StreamStatus {
        let failing = self.settings.alerts.manifest_failures > 0
            && self.manifest_failures >= self.settings.alerts.manifest_failures;
        if self.alerts.is_open(AlertType::InternalError) {
            StreamStatus::Error
        } else if !self.stream.enabled {
            StreamStatus::Disabled
        } else if failing || self.alerts.is_open(AlertType::StaleData) {
            StreamStatus::Offline
        } else if self.buffer.last_segment().is_none() {
            StreamStatus::Starting
        } else {
            StreamStatus::Online
        }
    }
}

fn push_transitions(transitions: &[AlertTransition], outcome: &mut Outcome) {
    for transition in transitions {
        outcome.push.push(match transition {
            AlertTransition::Raised(a) => PushPayload::AlertRaised(a.clone()),
            AlertTransition::Resolved(a) => PushPayload::AlertResolved(a.clone()),
        });
    }
}

fn ensure_finite(metric: &'static str, value: f64) -> Result<(), EvaluationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EvaluationError::NonFinite { metric })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::conformance::FaultCategory;
    use crate::types::health::HealthColor;
    use crate::types::telemetry::{FaultEvent, FetchFailure, LoudnessReading};

    fn t0() -> DateTime<Utc> {
        "2024-03-01T12:00:00Z".parse().unwrap()
    }

    fn stream() -> StreamConfig {
        StreamConfig {
            id: "s1".into(),
            name: "News HD".into(),
            manifest_url: "https://cdn.example.com/news/master.m3u8".into(),
            enabled: true,
            tags: vec![],
            created_at: t0(),
        }
    }

    fn monitor() -> StreamMonitor {
        StreamMonitor::new(stream(), MonitorConfig::default(), t0())
    }

    fn segment(seq: u64, secs: i64) -> TelemetryEvent {
        TelemetryEvent::Segment(SegmentMetric {
            stream_id: "s1".into(),
            sequence_number: seq,
            uri: format!("seg_{seq}.ts"),
            resolution: Some("1920x1080".into()),
            bandwidth: Some(5_000_000),
            codecs: Some("avc1.640028".into()),
            actual_bitrate: 4.8,
            download_speed: 40.0,
            segment_duration: 6.0,
            ttfb: 60.0,
            download_time: 700.0,
            segment_size_bytes: 3_600_000,
            timestamp: t0() + Duration::seconds(secs),
        })
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    #[test]
    fn healthy_segments_bring_stream_online() {
        let mut m = monitor();
        let outcome = m.ingest(segment(1, 0), at(0)).unwrap();
        assert_eq!(m.snapshot().status, StreamStatus::Online);
        assert_eq!(m.snapshot().health_score.value, 100);
        assert_eq!(
            outcome.status_change,
            Some((StreamStatus::Starting, StreamStatus::Online))
        );
        assert!(matches!(outcome.push[0], PushPayload::SegmentDownloaded(_)));
        assert!(matches!(
            outcome.push.last(),
            Some(PushPayload::HealthUpdate(_))
        ));
    }

    #[test]
    fn rejected_event_leaves_state_unchanged() {
        let mut m = monitor();
        m.ingest(segment(5, 0), at(0)).unwrap();
        let before = m.snapshot().clone();
        assert!(m.ingest(segment(4, 6), at(6)).is_err());
        assert_eq!(m.snapshot(), &before);
        assert_eq!(m.view().segments.len(), 1);
        assert_eq!(m.view().rejected_events, 1);
    }

    #[test]
    fn sync_faults_lower_score_and_raise_alert() {
        let mut m = monitor();
        m.ingest(segment(1, 0), at(0)).unwrap();
        let outcome = m
            .ingest(
                TelemetryEvent::Fault(FaultEvent {
                    stream_id: "s1".into(),
                    timestamp: at(1),
                    category: FaultCategory::Sync,
                    count: 2,
                }),
                at(1),
            )
            .unwrap();
        assert!(m.snapshot().health_score.value < 100);
        assert_eq!(m.snapshot().tr_conformance.sync_byte_errors, 2);
        assert!(outcome
            .transitions
            .iter()
            .any(|t| t.alert().alert_type == AlertType::SyncErrors));
    }

    #[test]
    fn silence_makes_stream_offline_then_recovers() {
        let mut m = monitor();
        m.ingest(segment(1, 0), at(0)).unwrap();
        let outcome = m.tick(at(40));
        assert_eq!(m.snapshot().status, StreamStatus::Offline);
        assert_eq!(
            outcome.status_change,
            Some((StreamStatus::Online, StreamStatus::Offline))
        );
        assert!(m.alerts().is_open(AlertType::StaleData));

        m.ingest(segment(2, 41), at(41)).unwrap();
        m.tick(at(42));
        m.tick(at(43));
        assert!(!m.alerts().is_open(AlertType::StaleData));
        assert_eq!(m.snapshot().status, StreamStatus::Online);
    }

    #[test]
    fn manifest_failures_take_stream_offline() {
        let mut m = monitor();
        m.ingest(segment(1, 0), at(0)).unwrap();
        for i in 1..=3 {
            m.ingest(
                TelemetryEvent::FetchFailed(FetchFailure {
                    stream_id: "s1".into(),
                    timestamp: at(i),
                    target: FetchTarget::Manifest,
                    message: Some("HTTP 503".into()),
                }),
                at(i),
            )
            .unwrap();
        }
        assert!(m.alerts().is_open(AlertType::ManifestUnreachable));
        assert_eq!(m.snapshot().status, StreamStatus::Offline);
        assert!(m.snapshot().uptime_percentage < 100.0);
    }

    #[test]
    fn loudness_alert_follows_classification() {
        let mut m = monitor();
        for i in 0..10 {
            m.ingest(
                TelemetryEvent::Loudness(LoudnessReading {
                    stream_id: "s1".into(),
                    timestamp: at(i),
                    momentary_lufs: Some(-10.0),
                    shortterm_lufs: None,
                    integrated_lufs: None,
                    rms_db: None,
                }),
                at(i),
            )
            .unwrap();
        }
        assert!(m.alerts().is_open(AlertType::LoudnessOutOfRange));
        assert_eq!(
            m.view().summary().loudness_status,
            crate::types::loudness::LoudnessStatus::TooLoud
        );
    }

    fn huge_ttfb(seq: u64, secs: i64) -> TelemetryEvent {
        let mut event = segment(seq, secs);
        if let TelemetryEvent::Segment(metric) = &mut event {
            metric.ttfb = f64::MAX;
        }
        event
    }

    #[test]
    fn evaluation_fault_keeps_last_snapshot() {
        let mut m = monitor();
        m.ingest(segment(1, 0), at(0)).unwrap();
        m.ingest(huge_ttfb(2, 6), at(6)).unwrap();
        let good = m.snapshot().clone();
        assert!(!m.alerts().is_open(AlertType::InternalError));

        // Two finite inputs whose sum overflows the TTFB average.
        let outcome = m.ingest(huge_ttfb(3, 12), at(12)).unwrap();
        assert!(outcome
            .push
            .iter()
            .any(|p| matches!(p, PushPayload::Error { .. })));
        assert!(outcome
            .transitions
            .iter()
            .any(|t| t.alert().alert_type == AlertType::InternalError));
        assert_eq!(m.snapshot(), &good);
        assert!(m.alerts().is_open(AlertType::InternalError));
    }

    #[test]
    fn internal_error_clears_after_good_cycles() {
        let mut m = monitor();
        m.ingest(segment(1, 0), at(0)).unwrap();
        m.ingest(huge_ttfb(2, 6), at(6)).unwrap();
        m.ingest(huge_ttfb(3, 12), at(12)).unwrap();
        assert!(m.alerts().is_open(AlertType::InternalError));

        // Push the overflowing samples out of the 20-segment window.
        for seq in 4..30 {
            let secs = seq as i64 * 6;
            m.ingest(segment(seq, secs), at(secs)).unwrap();
        }
        assert!(!m.alerts().is_open(AlertType::InternalError));
        assert_eq!(m.snapshot().health_score.color, HealthColor::Green);
    }

    #[test]
    fn acknowledge_and_resolve_through_monitor() {
        let mut m = monitor();
        m.ingest(segment(1, 0), at(0)).unwrap();
        m.tick(at(40));
        let id = "s1:stale_data:1";
        let acked = m.acknowledge(id).unwrap();
        assert!(acked.acknowledged);
        assert!(m.snapshot().active_alerts.iter().any(|a| a.alert_id == id && a.acknowledged));

        // Still stale, so resolving re-raises a new generation.
        let (resolved, outcome) = m.resolve(id, at(41)).unwrap();
        assert!(resolved.resolved);
        assert!(outcome
            .transitions
            .iter()
            .any(|t| matches!(t, AlertTransition::Raised(a) if a.alert_id == "s1:stale_data:2")));
        assert_eq!(m.resolve(id, at(42)).unwrap_err(), AlertError::AlreadyResolved(id.into()));
    }

    #[test]
    fn score_stays_in_range_under_heavy_faults() {
        let mut m = monitor();
        m.ingest(segment(1, 0), at(0)).unwrap();
        for i in 1..50 {
            let category = FaultCategory::ALL[(i % 5) as usize];
            m.ingest(
                TelemetryEvent::Fault(FaultEvent {
                    stream_id: "s1".into(),
                    timestamp: at(i),
                    category,
                    count: 100,
                }),
                at(i),
            )
            .unwrap();
            let score = &m.snapshot().health_score;
            assert_eq!(score.color, HealthColor::from_score(score.value));
        }
        assert_eq!(m.snapshot().health_score.value, 0);
        assert_eq!(m.snapshot().health_score.color, HealthColor::Red);
        assert!(m.alerts().is_open(AlertType::HealthCritical));
        assert!(!m.alerts().is_open(AlertType::HealthDegraded));
    }
    fn disabled_monitor() -> StreamMonitor {
        let mut config = stream();
        config.enabled = false;
        StreamMonitor::new(config, MonitorConfig::default(), t0())
    }

    fn manifest_failure(secs: i64) -> TelemetryEvent {
        TelemetryEvent::FetchFailed(FetchFailure {
            stream_id: "s1".into(),
            timestamp: at(secs),
            target: FetchTarget::Manifest,
            message: Some("HTTP 503".into()),
        })
    }

    #[test]
    fn disabled_stream_is_never_stale_or_offline() {
        let mut m = disabled_monitor();
        assert_eq!(m.snapshot().status, StreamStatus::Disabled);

        let outcome = m.tick(at(40));
        assert!(outcome.transitions.is_empty());
        assert!(outcome.status_change.is_none());
        assert!(!m.alerts().is_open(AlertType::StaleData));

        for i in 41..=45 {
            m.ingest(manifest_failure(i), at(i)).unwrap();
        }
        m.tick(at(600));
        assert!(!m.alerts().is_open(AlertType::ManifestUnreachable));
        assert_eq!(m.snapshot().status, StreamStatus::Disabled);
    }

    #[test]
    fn new_stream_gets_grace_before_staleness() {
        let mut m = monitor();
        m.tick(at(29));
        assert!(!m.alerts().is_open(AlertType::StaleData));
        assert_eq!(m.snapshot().status, StreamStatus::Starting);

        m.tick(at(30));
        assert!(m.alerts().is_open(AlertType::StaleData));
        assert_eq!(m.snapshot().status, StreamStatus::Offline);
    }

    #[test]
    fn rms_only_reading_is_stored_as_approximation() {
        let mut m = monitor();
        let outcome = m
            .ingest(
                TelemetryEvent::Loudness(LoudnessReading {
                    stream_id: "s1".into(),
                    timestamp: at(0),
                    momentary_lufs: None,
                    shortterm_lufs: None,
                    integrated_lufs: None,
                    rms_db: Some(-10.0),
                }),
                at(0),
            )
            .unwrap();
        assert!(matches!(
            &outcome.push[0],
            PushPayload::LoudnessData(sample) if sample.is_approximation
        ));

        let view = m.view();
        let sample = view.loudness.last().unwrap();
        assert!(sample.is_approximation);
        assert_eq!(sample.rms_db, Some(-10.0));
        assert_eq!(sample.momentary_lufs, None);
        assert!(view.features.loudness.approximated);
        assert_eq!(
            view.summary().loudness_status,
            crate::types::loudness::LoudnessStatus::NormalApproximated
        );
        assert!(!m.alerts().is_open(AlertType::LoudnessOutOfRange));
    }
}
