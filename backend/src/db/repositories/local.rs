//! In-memory local repository implementation.
//!
//! Stores everything in process memory behind a single lock. Suitable for
//! unit tests, local development and single-instance deployments.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::api::{
    AnalysisId, AnalysisRun, OwnerId, PredictionId, PredictionResult, ReportId, ReportSchedule,
    ReportStatus, ReportSummary, ReportTemplate, ScheduleId,
};
use crate::db::repository::*;

/// In-memory local repository.
///
/// Cloning shares the underlying data.
///
/// # Example
/// ```ignore
/// use hmpi_backend::db::repositories::LocalRepository;
///
/// let repo = LocalRepository::new();
/// let runs = repo.list_analyses(&owner).await?;
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct StoredPrediction {
    owner: OwnerId,
    prediction: PredictionResult,
}

struct LocalData {
    // Insertion order is creation order for every collection.
    analyses: Vec<AnalysisRun>,
    predictions: Vec<StoredPrediction>,
    reports: Vec<ReportSummary>,
    artifacts: HashMap<ReportId, Vec<u8>>,
    templates: Vec<(OwnerId, ReportTemplate)>,
    schedules: Vec<ReportSchedule>,

    // Connection health
    is_healthy: bool,
    failing: HashSet<String>,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            analyses: Vec::new(),
            predictions: Vec::new(),
            reports: Vec::new(),
            artifacts: HashMap::new(),
            templates: Vec::new(),
            schedules: Vec::new(),
            is_healthy: true,
            failing: HashSet::new(),
        }
    }
}

fn context(operation: &str, entity: &str, id: impl ToString) -> ErrorContext {
    ErrorContext::new(operation)
        .with_entity(entity)
        .with_entity_id(id)
}

fn page<T: Clone>(newest_first: impl Iterator<Item = T>, offset: usize, limit: usize) -> (Vec<T>, usize) {
    let all: Vec<T> = newest_first.collect();
    let total = all.len();
    let items = all.into_iter().skip(offset).take(limit).collect();
    (items, total)
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Flip the reported health, for exercising degraded paths.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Make writes through `operation` fail with a connection error, or clear it.
    pub fn fail_operation(&self, operation: &str, failing: bool) {
        let mut data = self.data.write();
        if failing {
            data.failing.insert(operation.to_string());
        } else {
            data.failing.remove(operation);
        }
    }

    /// Total number of stored predictions across all owners.
    pub fn prediction_count(&self) -> usize {
        self.data.read().predictions.len()
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn store_analysis(&self, run: AnalysisRun) -> RepositoryResult<AnalysisId> {
        let mut data = self.data.write();
        data.check_available("store_analysis")?;
        if data.analyses.iter().any(|r| r.id == run.id) {
            return Err(RepositoryError::conflict_with_context(
                "Analysis run already exists",
                context("store_analysis", "analysis", run.id),
            ));
        }
        let id = run.id;
        data.analyses.push(run);
        Ok(id)
    }

    async fn get_analysis(&self, owner: &OwnerId, id: AnalysisId) -> RepositoryResult<AnalysisRun> {
        let data = self.data.read();
        let run = data.analyses.iter().find(|r| r.id == id).ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("Analysis {} not found", id),
                context("get_analysis", "analysis", id),
            )
        })?;
        if &run.owner != owner {
            return Err(RepositoryError::forbidden_with_context(
                "Not authorized to access this analysis",
                context("get_analysis", "analysis", id),
            ));
        }
        Ok(run.clone())
    }

    async fn list_analyses(&self, owner: &OwnerId) -> RepositoryResult<Vec<AnalysisRun>> {
        let data = self.data.read();
        Ok(data
            .analyses
            .iter()
            .rev()
            .filter(|r| &r.owner == owner)
            .cloned()
            .collect())
    }

    async fn delete_analysis(&self, owner: &OwnerId, id: AnalysisId) -> RepositoryResult<()> {
        let mut data = self.data.write();
        let index = data.analyses.iter().position(|r| r.id == id).ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("Analysis {} not found", id),
                context("delete_analysis", "analysis", id),
            )
        })?;
        if &data.analyses[index].owner != owner {
            return Err(RepositoryError::forbidden_with_context(
                "Not authorized to delete this analysis",
                context("delete_analysis", "analysis", id),
            ));
        }
        data.analyses.remove(index);
        Ok(())
    }
}

#[async_trait]
impl PredictionRepository for LocalRepository {
    async fn store_predictions(
        &self,
        owner: &OwnerId,
        predictions: Vec<PredictionResult>,
    ) -> RepositoryResult<usize> {
        let mut data = self.data.write();
        data.check_available("store_predictions")?;
        let count = predictions.len();
        data.predictions
            .extend(predictions.into_iter().map(|prediction| StoredPrediction {
                owner: owner.clone(),
                prediction,
            }));
        Ok(count)
    }

    async fn get_prediction(
        &self,
        owner: &OwnerId,
        id: PredictionId,
    ) -> RepositoryResult<PredictionResult> {
        let data = self.data.read();
        let stored = data
            .predictions
            .iter()
            .find(|s| s.prediction.id == id)
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    format!("Prediction {} not found", id),
                    context("get_prediction", "prediction", id),
                )
            })?;
        if &stored.owner != owner {
            return Err(RepositoryError::forbidden_with_context(
                "Not authorized to access this prediction",
                context("get_prediction", "prediction", id),
            ));
        }
        Ok(stored.prediction.clone())
    }

    async fn get_predictions(
        &self,
        owner: &OwnerId,
        ids: &[PredictionId],
    ) -> RepositoryResult<Vec<PredictionResult>> {
        let data = self.data.read();
        let owned: HashMap<PredictionId, &PredictionResult> = data
            .predictions
            .iter()
            .filter(|s| &s.owner == owner)
            .map(|s| (s.prediction.id, &s.prediction))
            .collect();

        ids.iter()
            .map(|id| {
                owned.get(id).map(|p| (*p).clone()).ok_or_else(|| {
                    RepositoryError::not_found_with_context(
                        format!("Prediction {} not found", id),
                        context("get_predictions", "prediction", id),
                    )
                })
            })
            .collect()
    }

    async fn list_predictions(
        &self,
        owner: &OwnerId,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<(Vec<PredictionResult>, usize)> {
        let data = self.data.read();
        Ok(page(
            data.predictions
                .iter()
                .rev()
                .filter(|s| &s.owner == owner)
                .map(|s| s.prediction.clone()),
            offset,
            limit,
        ))
    }

    async fn query_predictions(
        &self,
        owner: &OwnerId,
        filter: &PredictionFilter,
    ) -> RepositoryResult<Vec<PredictionResult>> {
        let data = self.data.read();
        Ok(data
            .predictions
            .iter()
            .rev()
            .filter(|s| &s.owner == owner && filter.matches(&s.prediction))
            .take(filter.limit.unwrap_or(usize::MAX))
            .map(|s| s.prediction.clone())
            .collect())
    }

    async fn predictions_for_analysis(
        &self,
        owner: &OwnerId,
        analysis_id: AnalysisId,
    ) -> RepositoryResult<Vec<PredictionResult>> {
        let data = self.data.read();
        Ok(data
            .predictions
            .iter()
            .filter(|s| &s.owner == owner && s.prediction.analysis_id == Some(analysis_id))
            .map(|s| s.prediction.clone())
            .collect())
    }

    async fn delete_prediction(&self, owner: &OwnerId, id: PredictionId) -> RepositoryResult<()> {
        let mut data = self.data.write();
        let index = data
            .predictions
            .iter()
            .position(|s| s.prediction.id == id)
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    format!("Prediction {} not found", id),
                    context("delete_prediction", "prediction", id),
                )
            })?;
        if &data.predictions[index].owner != owner {
            return Err(RepositoryError::forbidden_with_context(
                "Not authorized to delete this prediction",
                context("delete_prediction", "prediction", id),
            ));
        }
        data.predictions.remove(index);
        Ok(())
    }
}

impl LocalData {
    fn check_available(&self, operation: &str) -> RepositoryResult<()> {
        if self.failing.contains(operation) {
            return Err(RepositoryError::ConnectionError {
                message: "Store unavailable".to_string(),
                context: ErrorContext::new(operation).retryable(),
            });
        }
        Ok(())
    }

    fn owned_report_index(
        &self,
        owner: &OwnerId,
        id: ReportId,
        operation: &str,
    ) -> RepositoryResult<usize> {
        self.reports
            .iter()
            .position(|r| r.id == id && &r.owner == owner)
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    format!("Report {} not found", id),
                    context(operation, "report", id),
                )
            })
    }
}

#[async_trait]
impl ReportRepository for LocalRepository {
    async fn create_report(&self, report: ReportSummary) -> RepositoryResult<ReportId> {
        let mut data = self.data.write();
        if data.reports.iter().any(|r| r.id == report.id) {
            return Err(RepositoryError::conflict_with_context(
                "Report already exists",
                context("create_report", "report", report.id),
            ));
        }
        let id = report.id;
        data.reports.push(report);
        Ok(id)
    }

    async fn get_report(&self, owner: &OwnerId, id: ReportId) -> RepositoryResult<ReportSummary> {
        let data = self.data.read();
        let index = data.owned_report_index(owner, id, "get_report")?;
        Ok(data.reports[index].clone())
    }

    async fn list_reports(
        &self,
        owner: &OwnerId,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<(Vec<ReportSummary>, usize)> {
        let data = self.data.read();
        Ok(page(
            data.reports.iter().rev().filter(|r| &r.owner == owner).cloned(),
            offset,
            limit,
        ))
    }

    async fn transition_report(
        &self,
        owner: &OwnerId,
        id: ReportId,
        expected: ReportStatus,
        update: ReportUpdate,
    ) -> RepositoryResult<ReportSummary> {
        let mut data = self.data.write();
        let index = data.owned_report_index(owner, id, "transition_report")?;
        let report = &mut data.reports[index];

        if report.status != expected || !expected.can_transition_to(update.status) {
            return Err(RepositoryError::conflict_with_context(
                format!("Cannot move report to {}", update.status),
                context("transition_report", "report", id)
                    .with_details(format!("expected {}, found {}", expected, report.status)),
            ));
        }

        report.status = update.status;
        if update.status.is_terminal() {
            report.completed_at = Some(Utc::now());
        }
        if let Some(count) = update.samples_count {
            report.samples_count = count;
        }
        report.download_url = update.download_url;
        report.file_size = update.file_size;
        report.message = update.message;
        Ok(report.clone())
    }

    async fn delete_report(&self, owner: &OwnerId, id: ReportId) -> RepositoryResult<()> {
        let mut data = self.data.write();
        let index = data.owned_report_index(owner, id, "delete_report")?;
        data.reports.remove(index);
        data.artifacts.remove(&id);
        Ok(())
    }

    async fn store_artifact(
        &self,
        owner: &OwnerId,
        id: ReportId,
        bytes: Vec<u8>,
    ) -> RepositoryResult<()> {
        let mut data = self.data.write();
        data.check_available("store_artifact")?;
        data.owned_report_index(owner, id, "store_artifact")?;
        data.artifacts.insert(id, bytes);
        Ok(())
    }

    async fn get_artifact(&self, owner: &OwnerId, id: ReportId) -> RepositoryResult<Vec<u8>> {
        let data = self.data.read();
        data.owned_report_index(owner, id, "get_artifact")?;
        data.artifacts.get(&id).cloned().ok_or_else(|| {
            RepositoryError::not_found_with_context(
                "Report artifact not found",
                context("get_artifact", "artifact", id),
            )
        })
    }

    async fn save_template(
        &self,
        owner: &OwnerId,
        template: ReportTemplate,
    ) -> RepositoryResult<ReportTemplate> {
        let mut data = self.data.write();
        data.templates.push((owner.clone(), template.clone()));
        Ok(template)
    }

    async fn list_templates(&self, owner: &OwnerId) -> RepositoryResult<Vec<ReportTemplate>> {
        let data = self.data.read();
        Ok(data
            .templates
            .iter()
            .filter(|(o, _)| o == owner)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn store_schedule(&self, schedule: ReportSchedule) -> RepositoryResult<ScheduleId> {
        let mut data = self.data.write();
        let id = schedule.id;
        data.schedules.push(schedule);
        Ok(id)
    }

    async fn list_schedules(&self, owner: &OwnerId) -> RepositoryResult<Vec<ReportSchedule>> {
        let data = self.data.read();
        Ok(data
            .schedules
            .iter()
            .filter(|s| &s.owner == owner)
            .cloned()
            .collect())
    }

    async fn delete_schedule(&self, owner: &OwnerId, id: ScheduleId) -> RepositoryResult<()> {
        let mut data = self.data.write();
        let index = data
            .schedules
            .iter()
            .position(|s| s.id == id && &s.owner == owner)
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    format!("Schedule {} not found", id),
                    context("delete_schedule", "schedule", id),
                )
            })?;
        data.schedules.remove(index);
        Ok(())
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod local_tests;
