use serde::{Deserialize, Serialize};

use crate::types::config::LoudnessConfig;
use crate::types::loudness::{LoudnessSample, LoudnessStatus};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LoudnessAssessment {
    pub status: LoudnessStatus,
    /// Mean LUFS (or RMS dB when approximated) over the sampled window.
    pub average: Option<f64>,
    pub approximated: bool,
    /// `average - target`; only meaningful on the LUFS path.
    pub deviation_from_target: Option<f64>,
    pub sample_count: usize,
}

impl LoudnessAssessment {
    fn unknown() -> Self {
        Self {
            status: LoudnessStatus::Unknown,
            average: None,
            approximated: false,
            deviation_from_target: None,
            sample_count: 0,
        }
    }
}

/// Classify the newest `config.sample_window` samples (`samples` is oldest first).
/// The latest sample decides the path: approximated samples are judged on RMS,
/// everything else on momentary LUFS.
pub fn classify(samples: &[LoudnessSample], config: &LoudnessConfig) -> LoudnessAssessment {
    let window = config.sample_window.max(1);
    let recent = &samples[samples.len().saturating_sub(window)..];
    let Some(latest) = recent.last() else {
        return LoudnessAssessment::unknown();
    };

    if latest.is_approximation {
        let values: Vec<f64> = recent
            .iter()
            .filter(|s| s.is_approximation)
            .filter_map(|s| s.rms())
            .collect();
        let Some(avg) = mean(&values) else {
            return LoudnessAssessment::unknown();
        };
        let status = if avg > config.rms_too_loud {
            LoudnessStatus::TooLoud
        } else if avg < config.rms_too_quiet {
            LoudnessStatus::TooQuiet
        } else {
            LoudnessStatus::NormalApproximated
        };
        return LoudnessAssessment {
            status,
            average: Some(avg),
            approximated: true,
            deviation_from_target: None,
            sample_count: values.len(),
        };
    }

    let values: Vec<f64> = recent
        .iter()
        .filter(|s| !s.is_approximation)
        .filter_map(|s| s.lufs())
        .collect();
    let Some(avg) = mean(&values) else {
        return LoudnessAssessment::unknown();
    };
    let status = if avg > config.lufs_too_loud {
        LoudnessStatus::TooLoud
    } else if avg < config.lufs_too_quiet {
        LoudnessStatus::TooQuiet
    } else {
        LoudnessStatus::Normal
    };
    LoudnessAssessment {
        status,
        average: Some(avg),
        approximated: false,
        deviation_from_target: Some(avg - config.target_lufs),
        sample_count: values.len(),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn lufs_samples(values: &[f64]) -> Vec<LoudnessSample> {
        let start = Utc::now();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| LoudnessSample {
                stream_id: "s1".into(),
                timestamp: start + Duration::seconds(i as i64),
                momentary_lufs: Some(v),
                shortterm_lufs: None,
                integrated_lufs: None,
                rms_db: None,
                is_approximation: false,
            })
            .collect()
    }

    fn rms_samples(values: &[f64]) -> Vec<LoudnessSample> {
        let start = Utc::now();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| LoudnessSample {
                stream_id: "s1".into(),
                timestamp: start + Duration::seconds(i as i64),
                momentary_lufs: None,
                shortterm_lufs: None,
                integrated_lufs: None,
                rms_db: Some(v),
                is_approximation: true,
            })
            .collect()
    }

    #[test]
    fn lufs_thresholds() {
        let cfg = LoudnessConfig::default();
        assert_eq!(classify(&lufs_samples(&[-10.0; 5]), &cfg).status, LoudnessStatus::TooLoud);
        assert_eq!(classify(&lufs_samples(&[-30.0; 5]), &cfg).status, LoudnessStatus::TooQuiet);
        let normal = classify(&lufs_samples(&[-20.0; 5]), &cfg);
        assert_eq!(normal.status, LoudnessStatus::Normal);
        assert_eq!(normal.deviation_from_target, Some(3.0));
    }

    #[test]
    fn only_last_ten_samples_count() {
        let cfg = LoudnessConfig::default();
        let mut values = vec![-40.0; 20];
        values.extend([-20.0; 10]);
        let result = classify(&lufs_samples(&values), &cfg);
        assert_eq!(result.status, LoudnessStatus::Normal);
        assert_eq!(result.sample_count, 10);
    }

    #[test]
    fn rms_path_when_latest_is_approximated() {
        let cfg = LoudnessConfig::default();
        assert_eq!(classify(&rms_samples(&[-2.0; 3]), &cfg).status, LoudnessStatus::TooLoud);
        assert_eq!(classify(&rms_samples(&[-20.0; 3]), &cfg).status, LoudnessStatus::TooQuiet);
        let normal = classify(&rms_samples(&[-10.0; 3]), &cfg);
        assert_eq!(normal.status, LoudnessStatus::NormalApproximated);
        assert!(normal.approximated);
    }

    #[test]
    fn no_samples_is_unknown() {
        let result = classify(&[], &LoudnessConfig::default());
        assert_eq!(result.status, LoudnessStatus::Unknown);
        assert_eq!(result.average, None);
    }
}
