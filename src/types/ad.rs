use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdMarkerKind {
    /// `EXT-X-DATERANGE` with SCTE-35 attributes.
    AdInsertion,
    /// `EXT-X-CUE-OUT` / `EXT-X-CUE-IN` pairs.
    SpliceNull,
    BandwidthReservation,
}

impl AdMarkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdMarkerKind::AdInsertion => "ad_insertion",
            AdMarkerKind::SpliceNull => "splice_null",
            AdMarkerKind::BandwidthReservation => "bandwidth_reservation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpliceDirection {
    Out,
    In,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<SpliceDirection>,
    /// Raw tag text as it appeared in the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdMarker {
    pub stream_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: AdMarkerKind,
    pub duration: Option<f64>,
    #[serde(default)]
    pub metadata: AdMetadata,
}
