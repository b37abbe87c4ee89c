use chrono::Utc;
use tracing::debug;

use crate::commands::AppState;
use crate::error::CommandError;
use crate::query::{
    self, CsvExport, ExportEntity, LoudnessReport, MetricsReport, SegmentPage, TimeRange,
    DEFAULT_PAGE_LIMIT,
};
use crate::types::ad::AdMarker;

const DEFAULT_EXPORT_RANGE: TimeRange = TimeRange::ThreeHours;

pub fn stream_metrics(
    state: &AppState,
    stream_id: &str,
    range: &str,
) -> Result<MetricsReport, CommandError> {
    let range: TimeRange = range.parse()?;
    let view = state.registry.view(stream_id)?;
    let report = query::metrics(&view, range, Utc::now());
    debug!("metrics query: {}", query::describe(&report));
    Ok(report)
}

pub fn stream_segments(
    state: &AppState,
    stream_id: &str,
    limit: Option<usize>,
    offset: Option<usize>,
) -> Result<SegmentPage, CommandError> {
    let view = state.registry.view(stream_id)?;
    Ok(query::segment_page(
        &view,
        limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        offset.unwrap_or(0),
    )?)
}

pub fn stream_loudness(
    state: &AppState,
    stream_id: &str,
    range: &str,
) -> Result<LoudnessReport, CommandError> {
    let range: TimeRange = range.parse()?;
    let view = state.registry.view(stream_id)?;
    Ok(query::loudness(&view, range, Utc::now()))
}

pub fn stream_ad_markers(state: &AppState, stream_id: &str) -> Result<Vec<AdMarker>, CommandError> {
    let view = state.registry.view(stream_id)?;
    Ok(query::ad_markers(&view))
}

/// `range` only applies to metrics and defaults to 3h.
pub fn stream_export(
    state: &AppState,
    stream_id: &str,
    entity: &str,
    range: Option<&str>,
) -> Result<CsvExport, CommandError> {
    let entity: ExportEntity = entity.parse()?;
    let range = match range {
        Some(r) => r.parse()?,
        None => DEFAULT_EXPORT_RANGE,
    };
    let view = state.registry.view(stream_id)?;
    Ok(query::export_csv(&view, entity, range, Utc::now()))
}
