use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored loudness measurement. Either the LUFS fields or `rms_db` carry
/// the value; `is_approximation` marks the RMS case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoudnessSample {
    pub stream_id: String,
    pub timestamp: DateTime<Utc>,
    pub momentary_lufs: Option<f64>,
    pub shortterm_lufs: Option<f64>,
    pub integrated_lufs: Option<f64>,
    pub rms_db: Option<f64>,
    pub is_approximation: bool,
}

impl LoudnessSample {
    /// Best LUFS value for classification: momentary, then short-term.
    pub fn lufs(&self) -> Option<f64> {
        self.momentary_lufs
            .or(self.shortterm_lufs)
            .filter(|v| v.is_finite())
    }

    pub fn rms(&self) -> Option<f64> {
        self.rms_db.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoudnessStatus {
    #[serde(rename = "Too Loud")]
    TooLoud,
    #[serde(rename = "Too Quiet")]
    TooQuiet,
    #[serde(rename = "Normal")]
    Normal,
    #[serde(rename = "Normal (approximated)")]
    NormalApproximated,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl LoudnessStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LoudnessStatus::TooLoud => "Too Loud",
            LoudnessStatus::TooQuiet => "Too Quiet",
            LoudnessStatus::Normal => "Normal",
            LoudnessStatus::NormalApproximated => "Normal (approximated)",
            LoudnessStatus::Unknown => "Unknown",
        }
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, LoudnessStatus::TooLoud | LoudnessStatus::TooQuiet)
    }
}
