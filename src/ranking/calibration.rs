// file: src/ranking/calibration.rs
// description: per-entity-type mapping from raw similarity into a shared [0, 1] score
// reference: min-max and affine score normalization for multi-index fusion

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// How raw similarities of one namespace become comparable scores.
///
/// Every output is clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Calibration {
    /// `(s - min) / (max - min)` for a backend with a known score range
    Range { min: f32, max: f32 },
    /// `s * scale + offset`
    Affine { scale: f32, offset: f32 },
    /// Min-max over the candidates fetched for this query
    MinMax,
}

impl Calibration {
    /// Cosine similarity with negative similarities treated as irrelevant.
    pub fn cosine() -> Self {
        Self::Range { min: 0.0, max: 1.0 }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Range { min, max } => {
                if !min.is_finite() || !max.is_finite() || max <= min {
                    return Err(SearchError::Config(format!(
                        "range calibration needs finite min < max, got {}..{}",
                        min, max
                    )));
                }
            }
            Self::Affine { scale, offset } => {
                if !scale.is_finite() || !offset.is_finite() || scale <= 0.0 {
                    return Err(SearchError::Config(
                        "affine calibration needs a finite positive scale".to_string(),
                    ));
                }
            }
            Self::MinMax => {}
        }
        Ok(())
    }

    /// Calibrates a batch of raw scores from one namespace, preserving order.
    pub fn apply(&self, raw: &[f32]) -> Vec<f32> {
        let sanitized = raw.iter().map(|s| if s.is_finite() { *s } else { f32::MIN });

        match *self {
            Self::Range { min, max } => sanitized.map(|s| clamp_unit((s - min) / (max - min))).collect(),
            Self::Affine { scale, offset } => sanitized.map(|s| clamp_unit(s * scale + offset)).collect(),
            Self::MinMax => {
                let values: Vec<f32> = sanitized.collect();
                let lo = values.iter().copied().fold(f32::INFINITY, f32::min);
                let hi = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let spread = hi - lo;

                values
                    .iter()
                    .map(|s| {
                        if !spread.is_finite() || spread <= f32::EPSILON {
                            1.0
                        } else {
                            clamp_unit((s - lo) / spread)
                        }
                    })
                    .collect()
            }
        }
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::cosine()
    }
}

fn clamp_unit(score: f32) -> f32 {
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}
