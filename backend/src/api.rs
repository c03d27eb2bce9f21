//! Public API surface for the HMPI backend.
//!
//! This file consolidates the identifier newtypes and re-exports the DTO types
//! used across the service and HTTP layers. All types derive
//! Serialize/Deserialize for JSON serialization.

pub use crate::models::analysis::{AnalysisResults, AnalysisRun, CalculatorParameters, ParameterSet};
pub use crate::models::prediction::{PredictionResult, RiskCategory};
pub use crate::models::report::{
    DateRange, LocationFilter, ReportConfig, ReportFormat, ReportSchedule, ReportStatus,
    ReportSummary, ReportTemplate, ScheduleFrequency, TemplateConfig,
};
pub use crate::models::sample::{GeoPoint, Sample, SampleInput};
pub use crate::services::aggregator::{AggregateSummary, CategoryShare, HistogramBin, MetalStats};

use serde::{Deserialize, Serialize};

use crate::define_id_type;

define_id_type!(
    /// Analysis run identifier (one per CSV upload).
    AnalysisId
);
define_id_type!(
    /// Prediction result identifier.
    PredictionId
);
define_id_type!(
    /// Report identifier.
    ReportId
);
define_id_type!(
    /// Sample identifier, assigned at validation time.
    SampleId
);
define_id_type!(
    /// Saved report template identifier.
    TemplateId
);
define_id_type!(
    /// Scheduled report identifier.
    ScheduleId
);

/// Identity of the caller that owns analysis runs, predictions and reports.
///
/// Attached to each request by the external identity service; this crate
/// never issues or verifies it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(value: impl Into<String>) -> Self {
        OwnerId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod api_tests;
