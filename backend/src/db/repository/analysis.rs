//! Analysis-run repository trait.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{AnalysisId, AnalysisRun, OwnerId};

/// Repository trait for persisted upload records.
///
/// Runs are immutable once stored. Reads and deletes of a run owned by
/// someone else fail with `Forbidden`.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Check that the backing store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Store a new run and return its id.
    async fn store_analysis(&self, run: AnalysisRun) -> RepositoryResult<AnalysisId>;

    /// Fetch one run owned by `owner`.
    async fn get_analysis(&self, owner: &OwnerId, id: AnalysisId) -> RepositoryResult<AnalysisRun>;

    /// All runs owned by `owner`, newest first.
    async fn list_analyses(&self, owner: &OwnerId) -> RepositoryResult<Vec<AnalysisRun>>;

    /// Delete one run owned by `owner`.
    async fn delete_analysis(&self, owner: &OwnerId, id: AnalysisId) -> RepositoryResult<()>;
}
