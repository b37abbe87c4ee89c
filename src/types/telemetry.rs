use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ad::{AdMarkerKind, AdMetadata};
use super::conformance::FaultCategory;
use super::segment::SegmentMetric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTarget {
    Manifest,
    Segment,
}

/// Result of one fetch attempt; feeds uptime and error rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub timestamp: DateTime<Utc>,
    pub target: FetchTarget,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Raw loudness reading as reported by the analyzer, before normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoudnessReading {
    pub stream_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub momentary_lufs: Option<f64>,
    #[serde(default)]
    pub shortterm_lufs: Option<f64>,
    #[serde(default)]
    pub integrated_lufs: Option<f64>,
    #[serde(default)]
    pub rms_db: Option<f64>,
}

/// An ad-signaling tag seen in a manifest refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdSignal {
    pub stream_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: AdMarkerKind,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub metadata: AdMetadata,
}

/// Already-classified transport fault occurrence(s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultEvent {
    pub stream_id: String,
    pub timestamp: DateTime<Utc>,
    pub category: FaultCategory,
    #[serde(default = "default_fault_count")]
    pub count: u32,
}

fn default_fault_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub stream_id: String,
    pub timestamp: DateTime<Utc>,
    pub target: FetchTarget,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestUpdate {
    pub stream_id: String,
    pub timestamp: DateTime<Utc>,
    pub variant_count: u32,
    #[serde(default)]
    pub segment_count: u32,
}

/// Everything the collector can tell a stream's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Segment(SegmentMetric),
    Loudness(LoudnessReading),
    Signal(AdSignal),
    Fault(FaultEvent),
    FetchFailed(FetchFailure),
    Manifest(ManifestUpdate),
}

impl TelemetryEvent {
    pub fn stream_id(&self) -> &str {
        match self {
            TelemetryEvent::Segment(e) => &e.stream_id,
            TelemetryEvent::Loudness(e) => &e.stream_id,
            TelemetryEvent::Signal(e) => &e.stream_id,
            TelemetryEvent::Fault(e) => &e.stream_id,
            TelemetryEvent::FetchFailed(e) => &e.stream_id,
            TelemetryEvent::Manifest(e) => &e.stream_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TelemetryEvent::Segment(e) => e.timestamp,
            TelemetryEvent::Loudness(e) => e.timestamp,
            TelemetryEvent::Signal(e) => e.timestamp,
            TelemetryEvent::Fault(e) => e.timestamp,
            TelemetryEvent::FetchFailed(e) => e.timestamp,
            TelemetryEvent::Manifest(e) => e.timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::Segment(_) => "segment",
            TelemetryEvent::Loudness(_) => "loudness",
            TelemetryEvent::Signal(_) => "signal",
            TelemetryEvent::Fault(_) => "fault",
            TelemetryEvent::FetchFailed(_) => "fetch_failed",
            TelemetryEvent::Manifest(_) => "manifest",
        }
    }
}
