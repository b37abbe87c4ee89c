use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Download measurements for one media segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetric {
    pub stream_id: String,
    pub sequence_number: u64,
    pub uri: String,
    pub resolution: Option<String>,
    /// Declared variant bandwidth in bits per second.
    pub bandwidth: Option<u64>,
    pub codecs: Option<String>,
    /// Mbps. Zero or absent means "derive from size and duration".
    #[serde(default)]
    pub actual_bitrate: f64,
    /// Mbps. Zero or absent means "derive from size and download time".
    #[serde(default)]
    pub download_speed: f64,
    /// Seconds
    pub segment_duration: f64,
    /// Milliseconds
    pub ttfb: f64,
    /// Milliseconds
    pub download_time: f64,
    pub segment_size_bytes: u64,
    pub timestamp: DateTime<Utc>,
}

impl SegmentMetric {
    pub fn size_mb(&self) -> f64 {
        size_mb(self.segment_size_bytes)
    }

    /// Fills rates the collector left at zero from the raw measurements.
    pub fn with_derived_rates(mut self) -> Self {
        if self.actual_bitrate == 0.0 {
            self.actual_bitrate = bitrate_mbps(self.segment_size_bytes, self.segment_duration);
        }
        if self.download_speed == 0.0 {
            self.download_speed = download_speed_mbps(self.segment_size_bytes, self.download_time);
        }
        self
    }

    /// Filename part of the segment URI, without query string.
    pub fn filename(&self) -> &str {
        let path = self.uri.split(['?', '#']).next().unwrap_or_default();
        path.rsplit('/').next().unwrap_or(path)
    }
}

/// Bitrate in Mbps of `size_bytes` played over `duration_secs`.
pub fn bitrate_mbps(size_bytes: u64, duration_secs: f64) -> f64 {
    if duration_secs <= 0.0 {
        return 0.0;
    }
    round3(size_bytes as f64 * 8.0 / duration_secs / 1_000_000.0)
}

/// Transfer speed in Mbps of `size_bytes` fetched in `download_ms`.
pub fn download_speed_mbps(size_bytes: u64, download_ms: f64) -> f64 {
    if download_ms <= 0.0 {
        return 0.0;
    }
    round3(size_bytes as f64 * 8.0 / (download_ms / 1000.0) / 1_000_000.0)
}

pub fn size_mb(size_bytes: u64) -> f64 {
    round3(size_bytes as f64 / 1_048_576.0)
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_of_two_megabyte_six_second_segment() {
        // 2_000_000 bytes * 8 / 6 s = 2.667 Mbps
        assert_eq!(bitrate_mbps(2_000_000, 6.0), 2.667);
        assert_eq!(bitrate_mbps(2_000_000, 0.0), 0.0);
    }

    #[test]
    fn download_speed_uses_milliseconds() {
        assert_eq!(download_speed_mbps(1_000_000, 500.0), 16.0);
        assert_eq!(download_speed_mbps(1_000_000, -1.0), 0.0);
    }

    #[test]
    fn size_in_binary_megabytes() {
        assert_eq!(size_mb(1_048_576), 1.0);
        assert_eq!(size_mb(524_288), 0.5);
    }

    #[test]
    fn filename_strips_path_and_query() {
        let metric = SegmentMetric {
            stream_id: "s".into(),
            sequence_number: 1,
            uri: "https://cdn.example.com/live/720p/seg_00042.ts?token=abc".into(),
            resolution: None,
            bandwidth: None,
            codecs: None,
            actual_bitrate: 0.0,
            download_speed: 0.0,
            segment_duration: 6.0,
            ttfb: 0.0,
            download_time: 0.0,
            segment_size_bytes: 0,
            timestamp: Utc::now(),
        };
        assert_eq!(metric.filename(), "seg_00042.ts");
    }
}
