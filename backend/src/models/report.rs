//! Report configuration, lifecycle state machine, templates and schedules.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::sample::GeoPoint;
use super::time::{parse_range_end, parse_timestamp};
use crate::api::{OwnerId, PredictionId, ReportId, ScheduleId, TemplateId};

/// Artifact format requested for a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    /// Delivered as CSV.
    Excel,
}

impl ReportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Excel => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Excel => "csv",
        }
    }
}

/// Report lifecycle state.
///
/// `pending -> processing -> {completed | failed}`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (ReportStatus::Pending, ReportStatus::Processing)
                | (ReportStatus::Processing, ReportStatus::Completed)
                | (ReportStatus::Processing, ReportStatus::Failed)
        )
    }

    /// Coarse progress percentage shown to clients.
    pub fn progress(&self) -> Option<u8> {
        match self {
            ReportStatus::Pending => Some(0),
            ReportStatus::Processing => Some(50),
            ReportStatus::Completed => Some(100),
            ReportStatus::Failed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Processing => "processing",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive date window; bare dates cover the whole end day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

impl DateRange {
    pub fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
        let start = parse_timestamp(&self.start_date)
            .ok_or_else(|| format!("Invalid startDate: '{}'", self.start_date))?;
        let end = parse_range_end(&self.end_date)
            .ok_or_else(|| format!("Invalid endDate: '{}'", self.end_date))?;
        if start > end {
            return Err("startDate must not be after endDate".to_string());
        }
        Ok((start, end))
    }
}

/// Circle filter; `radius` is in kilometres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFilter {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
}

impl LocationFilter {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.center().distance_km(point) <= self.radius
    }
}

/// What a report covers and how it is rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub date_range: DateRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationFilter>,
    #[serde(default)]
    pub include_charts: bool,
    #[serde(default)]
    pub include_map: bool,
    #[serde(default)]
    pub include_raw_data: bool,
    pub format: ReportFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_ids: Option<Vec<PredictionId>>,
}

impl ReportConfig {
    /// Check the parts of the config that can be wrong independently of data.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Report title must not be empty".to_string());
        }
        self.date_range.bounds()?;
        if let Some(location) = &self.location {
            if !(-90.0..=90.0).contains(&location.latitude)
                || !(-180.0..=180.0).contains(&location.longitude)
            {
                return Err("Location filter center is out of range".to_string());
            }
            if !location.radius.is_finite() || location.radius <= 0.0 {
                return Err("Location filter radius must be positive".to_string());
            }
        }
        Ok(())
    }
}

/// Persisted report record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: ReportId,
    #[serde(skip_serializing)]
    pub owner: OwnerId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub format: ReportFormat,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<usize>,
    /// User-facing failure message, set only when `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub samples_count: usize,
    pub config: ReportConfig,
}

impl ReportSummary {
    /// New report in the initial `pending` state.
    pub fn pending(owner: OwnerId, config: ReportConfig) -> Self {
        Self {
            id: ReportId::new(),
            owner,
            title: config.title.clone(),
            description: config.description.clone(),
            format: config.format,
            status: ReportStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            download_url: None,
            file_size: None,
            message: None,
            samples_count: 0,
            config,
        }
    }

    pub fn file_name(&self) -> String {
        format!("report-{}.{}", self.id, self.format.extension())
    }
}

/// Rendering options a template pre-fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConfig {
    pub include_charts: bool,
    pub include_map: bool,
    pub include_raw_data: bool,
    pub format: ReportFormat,
}

/// Named, reusable report settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTemplate {
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub config: TemplateConfig,
    /// `false` for the built-in templates every owner sees.
    #[serde(default)]
    pub custom: bool,
}

impl ReportTemplate {
    /// Templates available to every owner.
    pub fn builtin() -> Vec<ReportTemplate> {
        vec![ReportTemplate {
            id: TemplateId(uuid::Uuid::nil()),
            name: "Standard Report".to_string(),
            description: "Basic water quality report with charts and maps".to_string(),
            config: TemplateConfig {
                include_charts: true,
                include_map: true,
                include_raw_data: true,
                format: ReportFormat::Pdf,
            },
            custom: false,
        }]
    }
}

/// Recurrence of a scheduled report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl ScheduleFrequency {
    /// First run time strictly after `from`.
    pub fn next_run_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ScheduleFrequency::Daily => from + Duration::days(1),
            ScheduleFrequency::Weekly => from + Duration::weeks(1),
            ScheduleFrequency::Monthly => from
                .checked_add_months(chrono::Months::new(1))
                .unwrap_or(from + Duration::days(30)),
        }
    }
}

/// Stored definition of a recurring report. Execution happens elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSchedule {
    pub id: ScheduleId,
    #[serde(skip_serializing)]
    pub owner: OwnerId,
    pub frequency: ScheduleFrequency,
    pub config: ReportConfig,
    pub next_run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
