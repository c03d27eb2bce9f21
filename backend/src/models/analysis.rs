//! Analysis runs and the calculator parameter set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::{AnalysisId, OwnerId};
use crate::scoring::IndexResult;

/// Parameter set exactly as supplied by the caller; any part may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSet {
    #[serde(default)]
    pub metals: Option<Vec<String>>,
    #[serde(default)]
    pub standards: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub backgrounds: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub presence_limits: Option<BTreeMap<String, f64>>,
}

impl ParameterSet {
    /// Resolve into a complete [`CalculatorParameters`].
    ///
    /// Fails with a message naming every missing part. Metal names are trimmed
    /// and de-duplicated, keeping first-seen order.
    pub fn resolve(self) -> Result<CalculatorParameters, String> {
        let mut missing = Vec::new();
        if self.metals.is_none() {
            missing.push("metals");
        }
        if self.standards.is_none() {
            missing.push("standards");
        }
        if self.backgrounds.is_none() {
            missing.push("backgrounds");
        }
        if self.presence_limits.is_none() {
            missing.push("presenceLimits");
        }
        if !missing.is_empty() {
            return Err(format!(
                "Missing one or more required parameters: {}",
                missing.join(", ")
            ));
        }

        let mut metals: Vec<String> = Vec::new();
        for metal in self.metals.unwrap_or_default() {
            let metal = metal.trim().to_string();
            if metal.is_empty() {
                return Err("Metal names must not be blank".to_string());
            }
            if !metals.contains(&metal) {
                metals.push(metal);
            }
        }
        if metals.is_empty() {
            return Err("At least one metal must be declared".to_string());
        }

        Ok(CalculatorParameters {
            metals,
            standards: self.standards.unwrap_or_default(),
            backgrounds: self.backgrounds.unwrap_or_default(),
            presence_limits: self.presence_limits.unwrap_or_default(),
        })
    }
}

/// Complete parameter set for the index calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatorParameters {
    /// Declared metal columns, in declaration order.
    pub metals: Vec<String>,
    /// Regulatory standard per metal (mg/L).
    pub standards: BTreeMap<String, f64>,
    /// Geochemical background value per metal (mg/L).
    pub backgrounds: BTreeMap<String, f64>,
    /// Detection-presence limit per metal (mg/L).
    pub presence_limits: BTreeMap<String, f64>,
}

impl CalculatorParameters {
    /// Parameters declaring `metals` with empty reference tables.
    pub fn for_metals<I, S>(metals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metals: metals.into_iter().map(Into::into).collect(),
            standards: BTreeMap::new(),
            backgrounds: BTreeMap::new(),
            presence_limits: BTreeMap::new(),
        }
    }
}

/// Results payload stored with an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AnalysisResults {
    /// Raw calculator output.
    #[serde(rename_all = "camelCase")]
    Scored { index: IndexResult },
    /// Validity counts only; used when nothing was scored.
    #[serde(rename_all = "camelCase")]
    ValiditySummary {
        valid_samples: usize,
        invalid_samples: usize,
        processed_at: DateTime<Utc>,
    },
}

/// Persisted record of one CSV upload. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRun {
    pub id: AnalysisId,
    pub owner: OwnerId,
    pub file_name: String,
    /// SHA-256 of the uploaded bytes.
    pub checksum: String,
    pub input_parameters: CalculatorParameters,
    pub samples_count: usize,
    pub valid_samples: usize,
    pub invalid_samples: usize,
    pub results: AnalysisResults,
    pub created_at: DateTime<Utc>,
}
