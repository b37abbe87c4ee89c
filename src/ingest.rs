//! Per-stream ingest buffer.
//!
//! Each series is stored as sealed, immutable chunks plus one open head.
//! Snapshots clone the `Arc`s of sealed chunks and copy only the head, so
//! readers never copy the full history. Retention drops whole sealed chunks
//! whose newest entry fell behind the horizon.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::error::IngestError;
use crate::types::ad::AdMarker;
use crate::types::config::IngestConfig;
use crate::types::loudness::LoudnessSample;
use crate::types::segment::SegmentMetric;
use crate::types::telemetry::{
    AdSignal, FaultEvent, FetchOutcome, FetchTarget, LoudnessReading, ManifestUpdate,
    TelemetryEvent,
};

pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for SegmentMetric {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for LoudnessSample {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for AdMarker {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for FetchOutcome {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Append-only, chunked time series.
#[derive(Debug, Clone)]
pub struct Series<T> {
    sealed: Vec<Arc<Vec<T>>>,
    head: Vec<T>,
    chunk_len: usize,
}

impl<T: Clone + Timestamped> Series<T> {
    pub fn new(chunk_len: usize) -> Self {
        let chunk_len = chunk_len.max(1);
        Self {
            sealed: Vec::new(),
            head: Vec::with_capacity(chunk_len),
            chunk_len,
        }
    }

    pub fn push(&mut self, item: T) {
        self.head.push(item);
        if self.head.len() >= self.chunk_len {
            let full = std::mem::replace(&mut self.head, Vec::with_capacity(self.chunk_len));
            self.sealed.push(Arc::new(full));
        }
    }

    pub fn last(&self) -> Option<&T> {
        self.head
            .last()
            .or_else(|| self.sealed.last().and_then(|chunk| chunk.last()))
    }

    pub fn len(&self) -> usize {
        self.sealed.iter().map(|c| c.len()).sum::<usize>() + self.head.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty() && self.sealed.is_empty()
    }

    /// Drops sealed chunks whose newest entry is older than `cutoff`. Returns
    /// the number of entries removed.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let expired = self
            .sealed
            .iter()
            .take_while(|chunk| chunk.last().is_some_and(|e| e.timestamp() < cutoff))
            .count();
        let removed: usize = self.sealed.drain(..expired).map(|c| c.len()).sum();

        // With nothing sealed left, the head is the oldest data we hold.
        if self.sealed.is_empty() {
            let before = self.head.len();
            self.head.retain(|e| e.timestamp() >= cutoff);
            return removed + (before - self.head.len());
        }
        removed
    }

    pub fn snapshot(&self) -> SeriesSnapshot<T> {
        SeriesSnapshot {
            sealed: self.sealed.clone(),
            head: Arc::new(self.head.clone()),
        }
    }

    pub fn set_chunk_len(&mut self, chunk_len: usize) {
        self.chunk_len = chunk_len.max(1);
    }
}

/// Immutable view over a series at one point in time.
#[derive(Debug, Clone)]
pub struct SeriesSnapshot<T> {
    sealed: Vec<Arc<Vec<T>>>,
    head: Arc<Vec<T>>,
}

impl<T> Default for SeriesSnapshot<T> {
    fn default() -> Self {
        Self {
            sealed: Vec::new(),
            head: Arc::new(Vec::new()),
        }
    }
}

impl<T: Clone + Timestamped> SeriesSnapshot<T> {
    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.sealed
            .iter()
            .flat_map(|chunk| chunk.iter())
            .chain(self.head.iter())
    }

    pub fn len(&self) -> usize {
        self.sealed.iter().map(|c| c.len()).sum::<usize>() + self.head.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<&T> {
        self.head
            .last()
            .or_else(|| self.sealed.last().and_then(|chunk| chunk.last()))
    }

    /// Entries with `from <= timestamp <= to`, oldest first. Chunks entirely
    /// before `from` are skipped without scanning.
    pub fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<T> {
        let first_chunk = self
            .sealed
            .iter()
            .position(|chunk| chunk.last().is_some_and(|e| e.timestamp() >= from))
            .unwrap_or(self.sealed.len());
        self.sealed[first_chunk..]
            .iter()
            .flat_map(|chunk| chunk.iter())
            .chain(self.head.iter())
            .filter(|e| {
                let ts = e.timestamp();
                ts >= from && ts <= to
            })
            .cloned()
            .collect()
    }

    /// The newest `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<T> {
        let mut out: Vec<T> = self.iter().rev().take(n).cloned().collect();
        out.reverse();
        out
    }
}

/// What an accepted event turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Accepted {
    Segment(SegmentMetric),
    Loudness(LoudnessSample),
    Signal(AdSignal),
    Fault(FaultEvent),
    FetchFailed(FetchOutcome),
    Manifest(ManifestUpdate),
}

/// Validates and stores one stream's telemetry.
#[derive(Debug, Clone)]
pub struct IngestBuffer {
    stream_id: String,
    config: IngestConfig,
    segments: Series<SegmentMetric>,
    loudness: Series<LoudnessSample>,
    markers: Series<AdMarker>,
    fetches: Series<FetchOutcome>,
    // Newest accepted timestamp for series that are not stored here.
    last_seen: HashMap<&'static str, DateTime<Utc>>,
    rejected: u64,
}

impl IngestBuffer {
    pub fn new(stream_id: impl Into<String>, config: IngestConfig) -> Self {
        let chunk_len = config.chunk_len;
        Self {
            stream_id: stream_id.into(),
            config,
            segments: Series::new(chunk_len),
            loudness: Series::new(chunk_len),
            markers: Series::new(chunk_len),
            fetches: Series::new(chunk_len),
            last_seen: HashMap::new(),
            rejected: 0,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn reconfigure(&mut self, config: IngestConfig) {
        self.segments.set_chunk_len(config.chunk_len);
        self.loudness.set_chunk_len(config.chunk_len);
        self.markers.set_chunk_len(config.chunk_len);
        self.fetches.set_chunk_len(config.chunk_len);
        self.config = config;
    }

    /// Validates `event` and stores what belongs in a series. Rejections leave
    /// the buffer untouched apart from the rejection counter.
    pub fn append(&mut self, event: TelemetryEvent) -> Result<Accepted, IngestError> {
        let result = self.try_append(event);
        if let Err(err) = &result {
            self.rejected += 1;
            warn!(stream_id = %self.stream_id, error = %err, "telemetry event rejected");
        }
        result
    }

    fn try_append(&mut self, event: TelemetryEvent) -> Result<Accepted, IngestError> {
        if event.stream_id() != self.stream_id {
            return Err(IngestError::StreamMismatch {
                expected: self.stream_id.clone(),
                got: event.stream_id().to_string(),
            });
        }

        match event {
            TelemetryEvent::Segment(metric) => {
                self.check_segment(&metric)?;
                let metric = metric.with_derived_rates();
                self.segments.push(metric.clone());
                self.fetches.push(FetchOutcome {
                    timestamp: metric.timestamp,
                    target: FetchTarget::Segment,
                    success: true,
                    message: None,
                });
                Ok(Accepted::Segment(metric))
            }
            TelemetryEvent::Loudness(reading) => {
                let previous = self.loudness.last().map(|s| s.timestamp);
                self.check_order("loudness", previous, reading.timestamp)?;
                let sample = normalize_loudness(reading)?;
                self.loudness.push(sample.clone());
                Ok(Accepted::Loudness(sample))
            }
            TelemetryEvent::Signal(signal) => {
                self.check_unstored("signal", signal.timestamp)?;
                Ok(Accepted::Signal(signal))
            }
            TelemetryEvent::Fault(fault) => {
                if fault.count == 0 {
                    return Err(IngestError::Invalid {
                        kind: "fault",
                        reason: "count must be positive".into(),
                    });
                }
                self.check_unstored("fault", fault.timestamp)?;
                Ok(Accepted::Fault(fault))
            }
            TelemetryEvent::FetchFailed(failure) => {
                let previous = self.fetches.last().map(|f| f.timestamp);
                self.check_order("fetch_failed", previous, failure.timestamp)?;
                let outcome = FetchOutcome {
                    timestamp: failure.timestamp,
                    target: failure.target,
                    success: false,
                    message: failure.message,
                };
                self.fetches.push(outcome.clone());
                Ok(Accepted::FetchFailed(outcome))
            }
            TelemetryEvent::Manifest(update) => {
                let previous = self.fetches.last().map(|f| f.timestamp);
                self.check_order("manifest", previous, update.timestamp)?;
                self.fetches.push(FetchOutcome {
                    timestamp: update.timestamp,
                    target: FetchTarget::Manifest,
                    success: true,
                    message: None,
                });
                Ok(Accepted::Manifest(update))
            }
        }
    }

    fn check_segment(&self, metric: &SegmentMetric) -> Result<(), IngestError> {
        let numbers = [
            ("segment_duration", metric.segment_duration),
            ("actual_bitrate", metric.actual_bitrate),
            ("download_speed", metric.download_speed),
            ("ttfb", metric.ttfb),
            ("download_time", metric.download_time),
        ];
        if let Some((field, _)) = numbers.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(IngestError::Invalid {
                kind: "segment",
                reason: format!("{field} must be a finite, non-negative number"),
            });
        }

        let Some(last) = self.segments.last() else {
            return Ok(());
        };
        if metric.sequence_number < last.sequence_number {
            return Err(IngestError::StaleOrDuplicate {
                kind: "segment",
                reason: format!(
                    "sequence {} is behind last accepted {}",
                    metric.sequence_number, last.sequence_number
                ),
            });
        }
        if metric.sequence_number == last.sequence_number && metric.uri == last.uri {
            return Err(IngestError::StaleOrDuplicate {
                kind: "segment",
                reason: format!("sequence {} already ingested", metric.sequence_number),
            });
        }
        self.check_order("segment", Some(last.timestamp), metric.timestamp)
    }

    fn check_order(
        &self,
        kind: &'static str,
        previous: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), IngestError> {
        let Some(previous) = previous else {
            return Ok(());
        };
        let tolerance = Duration::milliseconds(self.config.backdate_tolerance_ms.max(0));
        if timestamp < previous - tolerance {
            return Err(IngestError::StaleOrDuplicate {
                kind,
                reason: format!("timestamp {timestamp} is older than {previous} beyond tolerance"),
            });
        }
        Ok(())
    }

    fn check_unstored(
        &mut self,
        kind: &'static str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), IngestError> {
        let previous = self.last_seen.get(kind).copied();
        self.check_order(kind, previous, timestamp)?;
        let newest = previous.map_or(timestamp, |p| p.max(timestamp));
        self.last_seen.insert(kind, newest);
        Ok(())
    }

    /// Stores a marker produced by signal detection.
    pub fn record_marker(&mut self, marker: AdMarker) {
        self.markers.push(marker);
    }

    /// Applies the retention horizons. Returns the number of entries dropped.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let horizon = now - Duration::seconds(self.config.retention_secs);
        let fetch_horizon = now - Duration::seconds(self.config.fetch_retention_secs);
        self.segments.prune_before(horizon)
            + self.loudness.prune_before(horizon)
            + self.markers.prune_before(horizon)
            + self.fetches.prune_before(fetch_horizon)
    }

    pub fn last_segment(&self) -> Option<&SegmentMetric> {
        self.segments.last()
    }

    pub fn segments(&self) -> SeriesSnapshot<SegmentMetric> {
        self.segments.snapshot()
    }

    pub fn loudness(&self) -> SeriesSnapshot<LoudnessSample> {
        self.loudness.snapshot()
    }

    pub fn markers(&self) -> SeriesSnapshot<AdMarker> {
        self.markers.snapshot()
    }

    pub fn fetches(&self) -> SeriesSnapshot<FetchOutcome> {
        self.fetches.snapshot()
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// LUFS is preferred; RMS stands in when no LUFS value is present.
pub fn normalize_loudness(reading: LoudnessReading) -> Result<LoudnessSample, IngestError> {
    let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
    let momentary = finite(reading.momentary_lufs);
    let shortterm = finite(reading.shortterm_lufs);
    let integrated = finite(reading.integrated_lufs);
    let rms = finite(reading.rms_db);

    if momentary.is_some() || shortterm.is_some() || integrated.is_some() {
        return Ok(LoudnessSample {
            stream_id: reading.stream_id,
            timestamp: reading.timestamp,
            momentary_lufs: momentary,
            shortterm_lufs: shortterm,
            integrated_lufs: integrated,
            rms_db: None,
            is_approximation: false,
        });
    }
    match rms {
        Some(rms_db) => Ok(LoudnessSample {
            stream_id: reading.stream_id,
            timestamp: reading.timestamp,
            momentary_lufs: None,
            shortterm_lufs: None,
            integrated_lufs: None,
            rms_db: Some(rms_db),
            is_approximation: true,
        }),
        None => Err(IngestError::Invalid {
            kind: "loudness",
            reason: "reading carries neither LUFS nor RMS".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::conformance::FaultCategory;

    fn t0() -> DateTime<Utc> {
        "2024-03-01T12:00:00Z".parse().unwrap()
    }

    fn segment(seq: u64, secs: i64) -> TelemetryEvent {
        TelemetryEvent::Segment(SegmentMetric {
            stream_id: "s1".into(),
            sequence_number: seq,
            uri: format!("seg_{seq}.ts"),
            resolution: Some("1920x1080".into()),
            bandwidth: Some(5_000_000),
            codecs: None,
            actual_bitrate: 4.8,
            download_speed: 30.0,
            segment_duration: 6.0,
            ttfb: 80.0,
            download_time: 900.0,
            segment_size_bytes: 3_600_000,
            timestamp: t0() + Duration::seconds(secs),
        })
    }

    fn buffer() -> IngestBuffer {
        IngestBuffer::new("s1", IngestConfig::default())
    }

    #[test]
    fn missing_rates_are_derived_from_measurements() {
        let mut buf = buffer();
        let mut event = segment(1, 0);
        if let TelemetryEvent::Segment(metric) = &mut event {
            metric.actual_bitrate = 0.0;
            metric.download_speed = 0.0;
        }
        let Accepted::Segment(stored) = buf.append(event).unwrap() else {
            panic!("segment expected");
        };
        // 3_600_000 bytes over 6 s, fetched in 900 ms.
        assert_eq!(stored.actual_bitrate, 4.8);
        assert_eq!(stored.download_speed, 32.0);
        assert_eq!(buf.last_segment().unwrap().actual_bitrate, 4.8);

        let Accepted::Segment(reported) = buf.append(segment(2, 6)).unwrap() else {
            panic!("segment expected");
        };
        assert_eq!(reported.download_speed, 30.0);
    }

    #[test]
    fn accepts_monotonic_segments() {
        let mut buf = buffer();
        for i in 0..5 {
            buf.append(segment(100 + i, i as i64 * 6)).unwrap();
        }
        assert_eq!(buf.segments().len(), 5);
        assert_eq!(buf.last_segment().unwrap().sequence_number, 104);
        assert_eq!(buf.fetches().len(), 5);
    }

    #[test]
    fn rejects_sequence_regression_without_side_effects() {
        let mut buf = buffer();
        buf.append(segment(10, 0)).unwrap();
        buf.append(segment(11, 6)).unwrap();
        let err = buf.append(segment(9, 12)).unwrap_err();
        assert!(matches!(err, IngestError::StaleOrDuplicate { kind: "segment", .. }));
        assert_eq!(buf.segments().len(), 2);
        assert_eq!(buf.fetches().len(), 2);
        assert_eq!(buf.last_segment().unwrap().sequence_number, 11);
        assert_eq!(buf.rejected(), 1);
    }

    #[test]
    fn duplicate_requires_same_sequence_and_uri() {
        let mut buf = buffer();
        buf.append(segment(10, 0)).unwrap();
        assert!(buf.append(segment(10, 1)).is_err());

        // Same sequence from another variant playlist is not a duplicate.
        let mut other = segment(10, 1);
        if let TelemetryEvent::Segment(m) = &mut other {
            m.uri = "720p/seg_10.ts".into();
        }
        buf.append(other).unwrap();
        assert_eq!(buf.segments().len(), 2);
    }

    #[test]
    fn backdating_within_tolerance_is_accepted() {
        let mut buf = buffer();
        buf.append(segment(1, 10)).unwrap();
        let mut late = segment(2, 9);
        buf.append(late.clone()).unwrap();
        if let TelemetryEvent::Segment(m) = &mut late {
            m.sequence_number = 3;
            m.timestamp = t0() + Duration::seconds(5);
        }
        assert!(buf.append(late).is_err());
    }

    #[test]
    fn rejects_foreign_stream() {
        let mut buf = IngestBuffer::new("other", IngestConfig::default());
        let err = buf.append(segment(1, 0)).unwrap_err();
        assert!(matches!(err, IngestError::StreamMismatch { .. }));
    }

    #[test]
    fn rejects_non_finite_measurements() {
        let mut buf = buffer();
        let mut bad = segment(1, 0);
        if let TelemetryEvent::Segment(m) = &mut bad {
            m.ttfb = f64::NAN;
        }
        assert!(matches!(
            buf.append(bad),
            Err(IngestError::Invalid { kind: "segment", .. })
        ));
    }

    #[test]
    fn loudness_falls_back_to_rms() {
        let reading = LoudnessReading {
            stream_id: "s1".into(),
            timestamp: t0(),
            momentary_lufs: None,
            shortterm_lufs: None,
            integrated_lufs: None,
            rms_db: Some(-12.0),
        };
        let sample = normalize_loudness(reading).unwrap();
        assert!(sample.is_approximation);
        assert_eq!(sample.rms_db, Some(-12.0));
    }

    #[test]
    fn loudness_prefers_lufs_and_drops_rms() {
        let reading = LoudnessReading {
            stream_id: "s1".into(),
            timestamp: t0(),
            momentary_lufs: Some(-23.0),
            shortterm_lufs: None,
            integrated_lufs: Some(-22.5),
            rms_db: Some(-12.0),
        };
        let sample = normalize_loudness(reading).unwrap();
        assert!(!sample.is_approximation);
        assert_eq!(sample.rms_db, None);
        assert_eq!(sample.momentary_lufs, Some(-23.0));
    }

    #[test]
    fn empty_loudness_reading_is_rejected() {
        let reading = LoudnessReading {
            stream_id: "s1".into(),
            timestamp: t0(),
            momentary_lufs: Some(f64::NEG_INFINITY),
            shortterm_lufs: None,
            integrated_lufs: None,
            rms_db: None,
        };
        assert!(normalize_loudness(reading).is_err());
    }

    #[test]
    fn fault_order_is_tracked_separately() {
        let mut buf = buffer();
        let fault = |secs: i64| {
            TelemetryEvent::Fault(FaultEvent {
                stream_id: "s1".into(),
                timestamp: t0() + Duration::seconds(secs),
                category: FaultCategory::Pcr,
                count: 1,
            })
        };
        buf.append(segment(1, 100)).unwrap();
        // Faults have their own ordering; an early fault is fine.
        buf.append(fault(10)).unwrap();
        buf.append(fault(20)).unwrap();
        assert!(buf.append(fault(5)).is_err());
    }

    #[test]
    fn series_seals_chunks_and_snapshots_share_them() {
        let mut series: Series<FetchOutcome> = Series::new(3);
        for i in 0..7 {
            series.push(FetchOutcome {
                timestamp: t0() + Duration::seconds(i),
                target: FetchTarget::Segment,
                success: true,
                message: None,
            });
        }
        let snap = series.snapshot();
        assert_eq!(snap.len(), 7);
        assert_eq!(snap.sealed.len(), 2);
        assert!(Arc::ptr_eq(&snap.sealed[0], &series.snapshot().sealed[0]));

        let tail = snap.tail(2);
        assert_eq!(tail[0].timestamp, t0() + Duration::seconds(5));
        assert_eq!(tail[1].timestamp, t0() + Duration::seconds(6));

        let window = snap.range(t0() + Duration::seconds(2), t0() + Duration::seconds(4));
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn prune_drops_whole_expired_chunks_only() {
        let mut series: Series<FetchOutcome> = Series::new(3);
        for i in 0..7 {
            series.push(FetchOutcome {
                timestamp: t0() + Duration::seconds(i),
                target: FetchTarget::Segment,
                success: true,
                message: None,
            });
        }
        // Chunk [0,1,2] is entirely expired, chunk [3,4,5] is not.
        let removed = series.prune_before(t0() + Duration::seconds(4));
        assert_eq!(removed, 3);
        assert_eq!(series.len(), 4);
        assert_eq!(
            series.snapshot().iter().next().unwrap().timestamp,
            t0() + Duration::seconds(3)
        );
    }

    #[test]
    fn retention_keeps_recent_window() {
        let mut buf = IngestBuffer::new(
            "s1",
            IngestConfig {
                chunk_len: 2,
                ..IngestConfig::default()
            },
        );
        let old = t0() - Duration::days(5);
        let mut first = segment(1, 0);
        if let TelemetryEvent::Segment(m) = &mut first {
            m.timestamp = old;
        }
        buf.append(first).unwrap();
        buf.append(segment(2, 0)).unwrap();
        buf.append(segment(3, 6)).unwrap();
        buf.prune(t0() + Duration::seconds(10));
        let kept: Vec<u64> = buf
            .segments()
            .iter()
            .map(|m| m.sequence_number)
            .collect();
        // The first sealed chunk holds a recent entry, so it survives.
        assert_eq!(kept, vec![1, 2, 3]);
    }
}
