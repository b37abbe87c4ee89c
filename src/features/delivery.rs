use serde::{Deserialize, Serialize};

use crate::types::config::DeliveryConfig;
use crate::types::segment::SegmentMetric;

/// Averages over the most recent segments.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeliveryStats {
    pub samples: usize,
    pub avg_ttfb_ms: f64,
    /// Download speed over actual bitrate; below 1.0 the stream downloads
    /// slower than real time.
    pub download_ratio: f64,
    pub avg_bitrate_mbps: f64,
    pub avg_download_speed_mbps: f64,
}

/// `segments` is oldest first. Returns `None` without data.
pub fn compute(segments: &[SegmentMetric], config: &DeliveryConfig) -> Option<DeliveryStats> {
    let window = config.sample_window.max(1);
    let recent = &segments[segments.len().saturating_sub(window)..];
    if recent.is_empty() {
        return None;
    }
    let n = recent.len() as f64;
    let avg_ttfb_ms = recent.iter().map(|s| s.ttfb).sum::<f64>() / n;
    let avg_bitrate_mbps = recent.iter().map(|s| s.actual_bitrate).sum::<f64>() / n;
    let avg_download_speed_mbps = recent.iter().map(|s| s.download_speed).sum::<f64>() / n;

    let ratios: Vec<f64> = recent
        .iter()
        .filter(|s| s.actual_bitrate > 0.0)
        .map(|s| (s.download_speed / s.actual_bitrate).min(config.max_download_ratio))
        .collect();
    let download_ratio = if ratios.is_empty() {
        1.0
    } else {
        ratios.iter().sum::<f64>() / ratios.len() as f64
    };

    Some(DeliveryStats {
        samples: recent.len(),
        avg_ttfb_ms,
        download_ratio,
        avg_bitrate_mbps,
        avg_download_speed_mbps,
    })
}
