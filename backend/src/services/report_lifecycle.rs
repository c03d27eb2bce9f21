//! Report lifecycle manager.
//!
//! Reports move `pending -> processing -> completed | failed`. Every
//! transition is a compare-and-set on the stored record, so two workers racing
//! on the same report cannot both win.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::aggregator::{
    aggregate, time_series, AggregateSummary, HistogramBin, MetalStats, TimeSeriesPoint,
};
use super::error::{ServiceError, ServiceResult};
use super::export::{artifact_headers, predictions_to_csv, render_report};
use super::predictions::clamp_page;
use crate::api::{
    DateRange, LocationFilter, OwnerId, PredictionId, PredictionResult, ReportConfig, ReportId,
    ReportSchedule, ReportStatus, ReportSummary, ReportTemplate, RiskCategory, ScheduleFrequency,
    ScheduleId, TemplateConfig, TemplateId,
};
use crate::db::{
    FullRepository, PredictionFilter, PredictionRepository, ReportRepository, ReportUpdate,
};

pub const DEFAULT_REPORT_LIMIT: usize = 20;

/// Status as reported to polling clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportStatusView {
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&ReportSummary> for ReportStatusView {
    fn from(report: &ReportSummary) -> Self {
        Self {
            status: report.status,
            progress: report.status.progress(),
            message: report.message.clone(),
        }
    }
}

/// Rendered artifact ready to be sent to the client.
#[derive(Debug, Clone)]
pub struct ReportArtifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPage {
    pub reports: Vec<ReportSummary>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDataSummary {
    pub total_samples: usize,
    pub safe_count: usize,
    pub caution_count: usize,
    pub unsafe_count: usize,
    #[serde(rename = "averageHMPI")]
    pub average_hmpi: f64,
    pub date_range: DateRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationFilter>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub hmpi_score: f64,
    pub risk_category: RiskCategory,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCharts {
    pub hmpi_distribution: Vec<HistogramBin>,
    pub metal_concentrations: Vec<MetalStats>,
    pub time_series_data: Vec<TimeSeriesPoint>,
    pub location_data: Vec<LocationPoint>,
}

/// Everything a client needs to preview a report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub report: ReportSummary,
    pub summary: ReportDataSummary,
    pub predictions: Vec<PredictionResult>,
    pub charts: ReportCharts,
}

fn charts(summary: &AggregateSummary, predictions: &[PredictionResult]) -> ReportCharts {
    ReportCharts {
        hmpi_distribution: summary.histogram.clone(),
        metal_concentrations: summary.metals.clone(),
        time_series_data: time_series(predictions),
        location_data: predictions
            .iter()
            .map(|p| LocationPoint {
                latitude: p.location.latitude,
                longitude: p.location.longitude,
                hmpi_score: p.hmpi_score,
                risk_category: p.risk_category,
            })
            .collect(),
    }
}

#[derive(Clone)]
pub struct ReportLifecycleManager {
    repository: Arc<dyn FullRepository>,
}

impl ReportLifecycleManager {
    pub fn new(repository: Arc<dyn FullRepository>) -> Self {
        Self { repository }
    }

    /// Store a new `pending` report. Never deduplicates.
    pub async fn create(&self, owner: &OwnerId, config: ReportConfig) -> ServiceResult<ReportSummary> {
        config.validate().map_err(ServiceError::BadRequest)?;
        let report = ReportSummary::pending(owner.clone(), config);
        self.repository.create_report(report.clone()).await?;
        tracing::info!(owner = %owner, report_id = %report.id, format = ?report.format, "Report created");
        Ok(report)
    }

    /// Create a report and assemble it in the background.
    pub async fn generate(&self, owner: &OwnerId, config: ReportConfig) -> ServiceResult<ReportId> {
        let report = self.create(owner, config).await?;
        let manager = self.clone();
        let owner = owner.clone();
        let id = report.id;
        tokio::spawn(async move {
            if let Err(e) = manager.process(&owner, id).await {
                tracing::error!(report_id = %id, error = %e, "Report processing aborted");
            }
        });
        Ok(id)
    }

    /// Drive a pending report to a terminal state.
    ///
    /// Assembly and artifact storage errors end in `failed` and are not
    /// returned; an error here means a transition itself was refused.
    pub async fn process(&self, owner: &OwnerId, id: ReportId) -> ServiceResult<ReportSummary> {
        let report = self
            .repository
            .transition_report(owner, id, ReportStatus::Pending, ReportUpdate::processing())
            .await?;
        tracing::debug!(report_id = %id, "Report processing started");

        let update = match self.assemble(owner, &report).await {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(report_id = %id, error = %e, "Report assembly failed");
                ReportUpdate::failed(e.user_message())
            }
        };

        let done = self
            .repository
            .transition_report(owner, id, ReportStatus::Processing, update)
            .await?;
        tracing::info!(
            report_id = %id,
            status = %done.status,
            samples = done.samples_count,
            "Report finished"
        );
        Ok(done)
    }

    /// Render and store the artifact; returns the completing update.
    async fn assemble(&self, owner: &OwnerId, report: &ReportSummary) -> ServiceResult<ReportUpdate> {
        let predictions = self.select(owner, &report.config).await?;
        let bytes = render_report(report, &predictions)?;
        let size = bytes.len();
        self.repository.store_artifact(owner, report.id, bytes).await?;
        Ok(ReportUpdate::completed(
            predictions.len(),
            format!("/v1/reports/{}/download", report.id),
            size,
        ))
    }

    /// Predictions a report covers: the explicit id list when given, otherwise
    /// the date window and optional location circle.
    async fn select(
        &self,
        owner: &OwnerId,
        config: &ReportConfig,
    ) -> ServiceResult<Vec<PredictionResult>> {
        if let Some(ids) = &config.prediction_ids {
            return Ok(self.repository.get_predictions(owner, ids).await?);
        }
        let (start, end) = config
            .date_range
            .bounds()
            .map_err(ServiceError::BadRequest)?;
        let filter = PredictionFilter {
            date_from: Some(start),
            date_to: Some(end),
            near: config.location.map(|l| (l.center(), l.radius)),
            ..Default::default()
        };
        Ok(self.repository.query_predictions(owner, &filter).await?)
    }

    pub async fn get(&self, owner: &OwnerId, id: ReportId) -> ServiceResult<ReportSummary> {
        Ok(self.repository.get_report(owner, id).await?)
    }

    pub async fn status(&self, owner: &OwnerId, id: ReportId) -> ServiceResult<ReportStatusView> {
        let report = self.repository.get_report(owner, id).await?;
        Ok(ReportStatusView::from(&report))
    }

    /// Artifact bytes of a completed report.
    pub async fn download(&self, owner: &OwnerId, id: ReportId) -> ServiceResult<ReportArtifact> {
        let report = self.repository.get_report(owner, id).await?;
        if report.status != ReportStatus::Completed {
            return Err(ServiceError::ReportNotReady {
                id,
                status: report.status,
            });
        }
        let bytes = self.repository.get_artifact(owner, id).await?;
        let (content_type, file_name) = artifact_headers(&report);
        Ok(ReportArtifact {
            bytes,
            content_type,
            file_name,
        })
    }

    /// Delete a report and its artifact. A second delete is `NotFound`.
    pub async fn delete(&self, owner: &OwnerId, id: ReportId) -> ServiceResult<()> {
        self.repository.delete_report(owner, id).await?;
        tracing::info!(owner = %owner, report_id = %id, "Report deleted");
        Ok(())
    }

    pub async fn list(
        &self,
        owner: &OwnerId,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> ServiceResult<ReportPage> {
        let (page, limit) = clamp_page(page, Some(limit.unwrap_or(DEFAULT_REPORT_LIMIT)));
        let offset = (page - 1).saturating_mul(limit);
        let (reports, total) = self.repository.list_reports(owner, offset, limit).await?;
        Ok(ReportPage {
            reports,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Preview data for a report, computed from its current selection.
    pub async fn report_data(&self, owner: &OwnerId, id: ReportId) -> ServiceResult<ReportData> {
        let report = self.repository.get_report(owner, id).await?;
        let predictions = self.select(owner, &report.config).await?;
        let aggregate = aggregate(&predictions);

        let summary = ReportDataSummary {
            total_samples: aggregate.total,
            safe_count: aggregate.count(RiskCategory::Safe),
            caution_count: aggregate.count(RiskCategory::Caution),
            unsafe_count: aggregate.count(RiskCategory::Unsafe),
            average_hmpi: aggregate.average_hmpi,
            date_range: report.config.date_range.clone(),
            location: report.config.location,
        };
        let charts = charts(&aggregate, &predictions);

        Ok(ReportData {
            report,
            summary,
            predictions,
            charts,
        })
    }

    /// Synchronous CSV export of the given predictions. Unknown or foreign
    /// ids fail the whole export.
    pub async fn export_csv(&self, owner: &OwnerId, ids: &[PredictionId]) -> ServiceResult<Vec<u8>> {
        if ids.is_empty() {
            return Err(ServiceError::BadRequest(
                "At least one prediction id is required".to_string(),
            ));
        }
        let predictions = self.repository.get_predictions(owner, ids).await?;
        predictions_to_csv(&predictions)
    }

    /// Built-in templates followed by the owner's own.
    pub async fn templates(&self, owner: &OwnerId) -> ServiceResult<Vec<ReportTemplate>> {
        let mut templates = ReportTemplate::builtin();
        templates.extend(self.repository.list_templates(owner).await?);
        Ok(templates)
    }

    pub async fn save_template(
        &self,
        owner: &OwnerId,
        name: String,
        description: Option<String>,
        config: TemplateConfig,
    ) -> ServiceResult<ReportTemplate> {
        if name.trim().is_empty() {
            return Err(ServiceError::BadRequest(
                "Template name must not be empty".to_string(),
            ));
        }
        let template = ReportTemplate {
            id: TemplateId::new(),
            name: name.trim().to_string(),
            description: description.unwrap_or_default(),
            config,
            custom: true,
        };
        Ok(self.repository.save_template(owner, template).await?)
    }

    /// Store a recurring report definition. Nothing is executed here.
    pub async fn schedule(
        &self,
        owner: &OwnerId,
        frequency: ScheduleFrequency,
        config: ReportConfig,
    ) -> ServiceResult<ReportSchedule> {
        config.validate().map_err(ServiceError::BadRequest)?;
        let now = Utc::now();
        let schedule = ReportSchedule {
            id: ScheduleId::new(),
            owner: owner.clone(),
            frequency,
            config,
            next_run_at: frequency.next_run_after(now),
            created_at: now,
        };
        self.repository.store_schedule(schedule.clone()).await?;
        tracing::info!(owner = %owner, schedule_id = %schedule.id, ?frequency, "Report scheduled");
        Ok(schedule)
    }

    pub async fn schedules(&self, owner: &OwnerId) -> ServiceResult<Vec<ReportSchedule>> {
        Ok(self.repository.list_schedules(owner).await?)
    }

    pub async fn cancel_schedule(&self, owner: &OwnerId, id: ScheduleId) -> ServiceResult<()> {
        Ok(self.repository.delete_schedule(owner, id).await?)
    }
}

#[cfg(test)]
#[path = "report_lifecycle_tests.rs"]
mod tests;
