use serde::{Deserialize, Serialize};

use crate::types::segment::SegmentMetric;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BitrateDeviation {
    pub declared_mbps: f64,
    pub actual_mbps: f64,
    /// `|actual - declared| / declared`
    pub deviation: f64,
}

/// Compares the mean actual bitrate of `segments` with the bandwidth the
/// newest segment's variant declares. Segments of other variants are skipped.
pub fn compute(segments: &[SegmentMetric]) -> Option<BitrateDeviation> {
    let latest = segments.last()?;
    let declared_bps = latest.bandwidth.filter(|b| *b > 0)?;
    let same_variant: Vec<f64> = segments
        .iter()
        .filter(|s| s.bandwidth == latest.bandwidth && s.resolution == latest.resolution)
        .map(|s| s.actual_bitrate)
        .collect();
    let actual_mbps = same_variant.iter().sum::<f64>() / same_variant.len() as f64;
    let declared_mbps = declared_bps as f64 / 1_000_000.0;
    Some(BitrateDeviation {
        declared_mbps,
        actual_mbps,
        deviation: (actual_mbps - declared_mbps).abs() / declared_mbps,
    })
}
