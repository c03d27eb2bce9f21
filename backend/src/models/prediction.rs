//! Scored samples and risk categories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::sample::{GeoPoint, Sample};
use crate::api::{AnalysisId, PredictionId, SampleId};

/// Scores strictly above this value are `unsafe`.
pub const UNSAFE_THRESHOLD: f64 = 100.0;
/// Scores strictly above this value (and not unsafe) are `caution`.
pub const CAUTION_THRESHOLD: f64 = 50.0;

/// Discretized HMPI band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Safe,
    Caution,
    Unsafe,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 3] = [RiskCategory::Safe, RiskCategory::Caution, RiskCategory::Unsafe];

    /// Classify an HMPI score: `> 100` unsafe, `(50, 100]` caution, `<= 50` safe.
    pub fn from_score(score: f64) -> Self {
        if score > UNSAFE_THRESHOLD {
            RiskCategory::Unsafe
        } else if score > CAUTION_THRESHOLD {
            RiskCategory::Caution
        } else {
            RiskCategory::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Safe => "safe",
            RiskCategory::Caution => "caution",
            RiskCategory::Unsafe => "unsafe",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "safe" => Ok(RiskCategory::Safe),
            "caution" => Ok(RiskCategory::Caution),
            "unsafe" => Ok(RiskCategory::Unsafe),
            other => Err(format!("Unknown risk category: {}", other)),
        }
    }
}

/// HMPI result for one sample. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub id: PredictionId,
    pub sample_id: SampleId,
    /// Upload this prediction was produced by, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<AnalysisId>,
    pub hmpi_score: f64,
    pub risk_category: RiskCategory,
    pub metal_concentrations: BTreeMap<String, f64>,
    pub location: GeoPoint,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PredictionResult {
    /// Build the prediction for `sample` with an already computed score.
    ///
    /// The risk category is always derived from the score, never supplied.
    pub fn from_sample(sample: &Sample, hmpi_score: f64, analysis_id: Option<AnalysisId>) -> Self {
        Self {
            id: PredictionId::new(),
            sample_id: sample.id,
            analysis_id,
            hmpi_score,
            risk_category: RiskCategory::from_score(hmpi_score),
            metal_concentrations: sample.metal_concentrations.clone(),
            location: sample.location(),
            date: sample.date,
            created_at: Utc::now(),
        }
    }
}
