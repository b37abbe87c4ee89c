//! Read-only queries over a published `StreamView`, plus CSV export.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::monitor::StreamView;
use crate::types::ad::AdMarker;
use crate::types::alert::Alert;
use crate::types::health::HealthSnapshot;
use crate::types::loudness::{LoudnessSample, LoudnessStatus};
use crate::types::segment::SegmentMetric;

pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "3min")]
    ThreeMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "3h")]
    ThreeHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "2d")]
    TwoDays,
    #[serde(rename = "4d")]
    FourDays,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::ThreeMinutes => "3min",
            TimeRange::ThirtyMinutes => "30min",
            TimeRange::ThreeHours => "3h",
            TimeRange::EightHours => "8h",
            TimeRange::TwoDays => "2d",
            TimeRange::FourDays => "4d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            TimeRange::ThreeMinutes => Duration::minutes(3),
            TimeRange::ThirtyMinutes => Duration::minutes(30),
            TimeRange::ThreeHours => Duration::hours(3),
            TimeRange::EightHours => Duration::hours(8),
            TimeRange::TwoDays => Duration::days(2),
            TimeRange::FourDays => Duration::days(4),
        }
    }

    /// `[now - range, now]`
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.duration(), now)
    }
}

impl FromStr for TimeRange {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3min" => Ok(TimeRange::ThreeMinutes),
            "30min" => Ok(TimeRange::ThirtyMinutes),
            "3h" => Ok(TimeRange::ThreeHours),
            "8h" => Ok(TimeRange::EightHours),
            "2d" => Ok(TimeRange::TwoDays),
            "4d" => Ok(TimeRange::FourDays),
            other => Err(QueryError::InvalidRange(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub count: usize,
    pub avg_bitrate_mbps: Option<f64>,
    pub avg_download_speed_mbps: Option<f64>,
    pub avg_ttfb_ms: Option<f64>,
    pub avg_download_time_ms: Option<f64>,
    pub total_bytes: u64,
}

impl MetricsSummary {
    pub fn from_segments(segments: &[SegmentMetric]) -> Self {
        let count = segments.len();
        let avg = |f: fn(&SegmentMetric) -> f64| {
            (count > 0).then(|| segments.iter().map(f).sum::<f64>() / count as f64)
        };
        Self {
            count,
            avg_bitrate_mbps: avg(|s| s.actual_bitrate),
            avg_download_speed_mbps: avg(|s| s.download_speed),
            avg_ttfb_ms: avg(|s| s.ttfb),
            avg_download_time_ms: avg(|s| s.download_time),
            total_bytes: segments.iter().map(|s| s.segment_size_bytes).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub stream_id: String,
    pub range: TimeRange,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub segments: Vec<SegmentMetric>,
    pub summary: MetricsSummary,
    pub health: HealthSnapshot,
}

/// Segments inside the range, oldest first, with averages.
pub fn metrics(view: &StreamView, range: TimeRange, now: DateTime<Utc>) -> MetricsReport {
    let (from, to) = range.bounds(now);
    let segments = view.segments.range(from, to);
    MetricsReport {
        stream_id: view.stream.id.clone(),
        range,
        from,
        to,
        summary: MetricsSummary::from_segments(&segments),
        segments,
        health: view.health.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentPage {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub items: Vec<SegmentMetric>,
}

/// Newest-first listing of everything retained.
pub fn segment_page(
    view: &StreamView,
    limit: usize,
    offset: usize,
) -> Result<SegmentPage, QueryError> {
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(QueryError::InvalidLimit {
            got: limit,
            max: MAX_PAGE_LIMIT,
        });
    }
    let items = view
        .segments
        .iter()
        .rev()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect();
    Ok(SegmentPage {
        total: view.segments.len(),
        limit,
        offset,
        items,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct LoudnessReport {
    pub stream_id: String,
    pub range: TimeRange,
    pub samples: Vec<LoudnessSample>,
    pub status: LoudnessStatus,
    pub average: Option<f64>,
    pub approximated: bool,
}

pub fn loudness(view: &StreamView, range: TimeRange, now: DateTime<Utc>) -> LoudnessReport {
    let (from, to) = range.bounds(now);
    let assessment = &view.features.loudness;
    LoudnessReport {
        stream_id: view.stream.id.clone(),
        range,
        samples: view.loudness.range(from, to),
        status: assessment.status,
        average: assessment.average,
        approximated: assessment.approximated,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertList {
    pub alerts: Vec<Alert>,
    pub open_count: usize,
}

/// Newest first. Resolved alerts are left out unless asked for.
pub fn alerts(view: &StreamView, include_resolved: bool) -> AlertList {
    let mut alerts: Vec<Alert> = view
        .alerts
        .iter()
        .filter(|a| include_resolved || a.is_open())
        .cloned()
        .collect();
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    AlertList {
        open_count: view.alerts.iter().filter(|a| a.is_open()).count(),
        alerts,
    }
}

pub fn ad_markers(view: &StreamView) -> Vec<AdMarker> {
    view.ad_markers.iter().cloned().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportEntity {
    Metrics,
    Alerts,
    Loudness,
    Ads,
}

impl ExportEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportEntity::Metrics => "metrics",
            ExportEntity::Alerts => "alerts",
            ExportEntity::Loudness => "loudness",
            ExportEntity::Ads => "ads",
        }
    }
}

impl FromStr for ExportEntity {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metrics" => Ok(ExportEntity::Metrics),
            "alerts" => Ok(ExportEntity::Alerts),
            "loudness" => Ok(ExportEntity::Loudness),
            "ads" | "scte35" => Ok(ExportEntity::Ads),
            other => Err(QueryError::InvalidEntity(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvExport {
    pub filename: String,
    pub content: String,
}

const METRICS_HEADER: &[&str] = &[
    "timestamp",
    "sequence_number",
    "segment_duration",
    "segment_size_mb",
    "actual_bitrate",
    "declared_bitrate",
    "download_time",
    "download_speed",
    "ttfb",
    "resolution",
    "filename",
];

const ALERTS_HEADER: &[&str] = &[
    "id",
    "timestamp",
    "alert_type",
    "severity",
    "message",
    "threshold_value",
    "actual_value",
    "resolved",
    "resolved_at",
    "acknowledged",
];

const LOUDNESS_HEADER: &[&str] = &[
    "timestamp",
    "momentary_lufs",
    "shortterm_lufs",
    "integrated_lufs",
    "rms_db",
    "is_approximation",
];

const ADS_HEADER: &[&str] = &[
    "timestamp",
    "event_type",
    "duration",
    "signal_id",
    "class",
    "direction",
];

/// Serializes one entity to CSV. Metrics honour `range`; the other entities
/// export everything retained. An empty series yields only the header row.
pub fn export_csv(
    view: &StreamView,
    entity: ExportEntity,
    range: TimeRange,
    now: DateTime<Utc>,
) -> CsvExport {
    let mut table = CsvTable::new();
    match entity {
        ExportEntity::Metrics => {
            table.row(METRICS_HEADER.iter().map(|h| h.to_string()));
            let (from, to) = range.bounds(now);
            for m in view.segments.range(from, to) {
                table.row([
                    m.timestamp.to_rfc3339(),
                    m.sequence_number.to_string(),
                    m.segment_duration.to_string(),
                    m.size_mb().to_string(),
                    m.actual_bitrate.to_string(),
                    opt(m.bandwidth.map(|b| b as f64 / 1_000_000.0)),
                    m.download_time.to_string(),
                    m.download_speed.to_string(),
                    m.ttfb.to_string(),
                    m.resolution.clone().unwrap_or_default(),
                    m.filename().to_string(),
                ]);
            }
        }
        ExportEntity::Alerts => {
            table.row(ALERTS_HEADER.iter().map(|h| h.to_string()));
            for a in alerts(view, true).alerts {
                table.row([
                    a.alert_id.clone(),
                    a.timestamp.to_rfc3339(),
                    a.alert_type.as_str().to_string(),
                    a.severity.as_str().to_string(),
                    a.message.clone(),
                    a.metadata.threshold_value().unwrap_or_default(),
                    a.metadata.actual_value().unwrap_or_default(),
                    a.resolved.to_string(),
                    a.resolved_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                    a.acknowledged.to_string(),
                ]);
            }
        }
        ExportEntity::Loudness => {
            table.row(LOUDNESS_HEADER.iter().map(|h| h.to_string()));
            for s in view.loudness.iter() {
                table.row([
                    s.timestamp.to_rfc3339(),
                    opt(s.momentary_lufs),
                    opt(s.shortterm_lufs),
                    opt(s.integrated_lufs),
                    opt(s.rms_db),
                    s.is_approximation.to_string(),
                ]);
            }
        }
        ExportEntity::Ads => {
            table.row(ADS_HEADER.iter().map(|h| h.to_string()));
            for m in view.ad_markers.iter() {
                table.row([
                    m.timestamp.to_rfc3339(),
                    m.kind.as_str().to_string(),
                    opt(m.duration),
                    m.metadata.signal_id.clone().unwrap_or_default(),
                    m.metadata.class.clone().unwrap_or_default(),
                    m.metadata
                        .direction
                        .map(|d| format!("{d:?}").to_lowercase())
                        .unwrap_or_default(),
                ]);
            }
        }
    }

    CsvExport {
        filename: export_filename(&view.stream.name, entity, now),
        content: table.finish(),
    }
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn export_filename(stream_name: &str, entity: ExportEntity, now: DateTime<Utc>) -> String {
    let safe: String = stream_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!(
        "{safe}_{}_{}.csv",
        entity.as_str(),
        now.format("%Y%m%d_%H%M%S")
    )
}

struct CsvTable {
    out: String,
}

impl CsvTable {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn row<I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = String>,
    {
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                self.out.push(',');
            }
            self.out.push_str(&escape_field(&field));
        }
        self.out.push_str("\r\n");
    }

    fn finish(self) -> String {
        self.out
    }
}

/// RFC 4180 quoting: fields containing a delimiter, quote or line break are
/// wrapped in quotes with inner quotes doubled.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        let mut quoted = String::with_capacity(field.len() + 2);
        quoted.push('"');
        for c in field.chars() {
            if c == '"' {
                quoted.push('"');
            }
            quoted.push(c);
        }
        quoted.push('"');
        quoted
    } else {
        field.to_string()
    }
}

/// Renders a one-line overview, used in logs.
pub fn describe(report: &MetricsReport) -> String {
    let mut line = format!(
        "{} [{}]: {} segments",
        report.stream_id,
        report.range.as_str(),
        report.summary.count
    );
    if let Some(bitrate) = report.summary.avg_bitrate_mbps {
        let _ = write!(line, ", avg {bitrate:.2} Mbps");
    }
    line
}
