//! Data Transfer Objects for the HTTP API.
//!
//! Domain types that already derive Serialize/Deserialize are used directly;
//! the types here only cover request bodies, query strings and envelopes.

use serde::{Deserialize, Serialize};

use crate::api::{
    AnalysisRun, PredictionId, ReportConfig, ReportId, ReportStatus, ScheduleFrequency,
    TemplateConfig,
};
use crate::scoring::ServiceHealth;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Version of the API
    pub version: String,
    /// Repository status
    pub database: String,
    /// Probe result of the scoring strategy
    pub scoring: ServiceHealth,
}

/// Query parameters for paginated listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Query parameters for the location search. `radius` is in kilometres.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
}

/// Query parameters for the date range search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatestQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Analysis runs of the caller, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisListResponse {
    pub analyses: Vec<AnalysisRun>,
    pub total: usize,
}

/// Response for report generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportResponse {
    pub report_id: ReportId,
    pub status: ReportStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportCsvRequest {
    pub prediction_ids: Vec<PredictionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub config: TemplateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub frequency: ScheduleFrequency,
    pub config: ReportConfig,
}

/// Generic acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
