//! Report repository trait: report records, artifacts, templates, schedules.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{
    OwnerId, ReportId, ReportSchedule, ReportStatus, ReportSummary, ReportTemplate, ScheduleId,
};

/// Fields written together with a status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportUpdate {
    pub status: ReportStatus,
    pub samples_count: Option<usize>,
    pub download_url: Option<String>,
    pub file_size: Option<usize>,
    pub message: Option<String>,
}

impl ReportUpdate {
    pub fn processing() -> Self {
        Self {
            status: ReportStatus::Processing,
            samples_count: None,
            download_url: None,
            file_size: None,
            message: None,
        }
    }

    pub fn completed(samples_count: usize, download_url: String, file_size: usize) -> Self {
        Self {
            status: ReportStatus::Completed,
            samples_count: Some(samples_count),
            download_url: Some(download_url),
            file_size: Some(file_size),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Failed,
            samples_count: None,
            download_url: None,
            file_size: None,
            message: Some(message.into()),
        }
    }
}

/// Repository trait for report records and their artifacts.
///
/// Reports owned by someone else are reported as `NotFound`.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Store a new report record.
    async fn create_report(&self, report: ReportSummary) -> RepositoryResult<ReportId>;

    async fn get_report(&self, owner: &OwnerId, id: ReportId) -> RepositoryResult<ReportSummary>;

    /// One page of reports, newest first, plus the owner's total.
    async fn list_reports(
        &self,
        owner: &OwnerId,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<(Vec<ReportSummary>, usize)>;

    /// Atomically move a report from `expected` to `update.status`.
    ///
    /// Fails with `Conflict` if the stored status is no longer `expected` or
    /// the state machine forbids the move. Returns the updated record.
    async fn transition_report(
        &self,
        owner: &OwnerId,
        id: ReportId,
        expected: ReportStatus,
        update: ReportUpdate,
    ) -> RepositoryResult<ReportSummary>;

    /// Remove a report and its artifact.
    async fn delete_report(&self, owner: &OwnerId, id: ReportId) -> RepositoryResult<()>;

    /// Attach the rendered artifact to a report.
    async fn store_artifact(&self, owner: &OwnerId, id: ReportId, bytes: Vec<u8>)
        -> RepositoryResult<()>;

    async fn get_artifact(&self, owner: &OwnerId, id: ReportId) -> RepositoryResult<Vec<u8>>;

    /// Save an owner's custom template.
    async fn save_template(
        &self,
        owner: &OwnerId,
        template: ReportTemplate,
    ) -> RepositoryResult<ReportTemplate>;

    /// Custom templates saved by `owner`.
    async fn list_templates(&self, owner: &OwnerId) -> RepositoryResult<Vec<ReportTemplate>>;

    async fn store_schedule(&self, schedule: ReportSchedule) -> RepositoryResult<ScheduleId>;

    async fn list_schedules(&self, owner: &OwnerId) -> RepositoryResult<Vec<ReportSchedule>>;

    async fn delete_schedule(&self, owner: &OwnerId, id: ScheduleId) -> RepositoryResult<()>;
}
