//! Calculator output and the per-sample HMPI scoring function.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::Sample;

/// Raw output of a scoring strategy.
///
/// Mirrors the `data[0]` object of the remote scoring protocol. Unknown keys
/// are kept in `extra` so the stored analysis run carries the full payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResult {
    #[serde(default)]
    pub processed_data: Vec<Value>,
    #[serde(default)]
    pub summary: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IndexResult {
    /// HMPI reported for the `index`-th sample, if present and usable.
    pub fn hmpi_at(&self, index: usize) -> Option<f64> {
        self.processed_data
            .get(index)?
            .get("HMPI")?
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
    }

    /// Final score for each sample, in input order.
    ///
    /// Uses the reported HMPI where available and the local mean otherwise.
    pub fn scores_for(&self, samples: &[Sample], metals: &[String]) -> Vec<f64> {
        samples
            .iter()
            .enumerate()
            .map(|(i, sample)| self.hmpi_at(i).unwrap_or_else(|| score_sample(sample, metals)))
            .collect()
    }
}

/// HMPI of one sample: the mean concentration across the declared metals.
///
/// Undeclared metals are ignored and a metal missing from the sample counts
/// as zero. No declared metals scores `0.0`.
pub fn score_sample(sample: &Sample, metals: &[String]) -> f64 {
    if metals.is_empty() {
        return 0.0;
    }
    let total: f64 = metals
        .iter()
        .map(|metal| sample.concentration(metal).unwrap_or(0.0))
        .sum();
    total / metals.len() as f64
}
