pub mod ads;
pub mod bitrate;
pub mod delivery;
pub mod loudness;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ad::AdMarker;
use crate::types::config::MonitorConfig;
use crate::types::loudness::LoudnessSample;
use crate::types::segment::SegmentMetric;
use crate::types::telemetry::{AdSignal, ManifestUpdate};

use self::ads::AdDetector;
use self::bitrate::BitrateDeviation;
use self::delivery::DeliveryStats;
use self::loudness::LoudnessAssessment;

/// Latest declared and measured video properties.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct VideoState {
    pub bitrate_mbps: Option<f64>,
    pub declared_bandwidth: Option<u64>,
    pub resolution: Option<String>,
    pub codecs: Option<String>,
    pub sequence_number: Option<u64>,
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VariantDrop {
    pub previous: u32,
    pub current: u32,
}

/// Everything derived from the buffered series, computed once per cycle.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FeatureSummary {
    pub video: VideoState,
    pub delivery: Option<DeliveryStats>,
    pub bitrate: Option<BitrateDeviation>,
    pub loudness: LoudnessAssessment,
    pub variant_count: Option<u32>,
    pub variant_drop: Option<VariantDrop>,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    video: VideoState,
    ads: AdDetector,
    variant_count: Option<u32>,
    variant_drop: Option<VariantDrop>,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_segment(&mut self, metric: &SegmentMetric) {
        self.video = VideoState {
            bitrate_mbps: Some(metric.actual_bitrate),
            declared_bandwidth: metric.bandwidth,
            resolution: metric.resolution.clone(),
            codecs: metric.codecs.clone().or_else(|| self.video.codecs.take()),
            sequence_number: Some(metric.sequence_number),
            observed_at: Some(metric.timestamp),
        };
    }

    /// A drop is remembered until the next manifest update.
    pub fn observe_manifest(&mut self, update: &ManifestUpdate) {
        self.variant_drop = match self.variant_count {
            Some(previous) if update.variant_count < previous => Some(VariantDrop {
                previous,
                current: update.variant_count,
            }),
            _ => None,
        };
        self.variant_count = Some(update.variant_count);
    }

    pub fn detect_signal(&mut self, signal: AdSignal) -> Option<AdMarker> {
        self.ads.detect(signal)
    }

    pub fn prune(&mut self, cutoff: DateTime<Utc>) {
        self.ads.prune_before(cutoff);
    }

    /// `segments` and `loudness` are the newest entries, oldest first.
    pub fn summarize(
        &self,
        segments: &[SegmentMetric],
        loudness: &[LoudnessSample],
        config: &MonitorConfig,
    ) -> FeatureSummary {
        FeatureSummary {
            video: self.video.clone(),
            delivery: delivery::compute(segments, &config.delivery),
            bitrate: bitrate::compute(segments),
            loudness: loudness::classify(loudness, &config.loudness),
            variant_count: self.variant_count,
            variant_drop: self.variant_drop.clone(),
        }
    }
}
