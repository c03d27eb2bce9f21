//! Persistence gateway.
//!
//! Durable storage for analysis runs, predictions and report records via the
//! repository pattern, so backing stores can be swapped without touching the
//! services.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Services (upload pipeline, predictions, reports)        │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Traits (repository/) - Abstract Interface    │
//! │  AnalysisRepository · PredictionRepository ·             │
//! │  ReportRepository  ⇒  FullRepository                     │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────▼──────────────────────────────┐
//!     │             Local Repository                  │
//!     │               (in-memory)                     │
//!     └──────────────────────────────────────────────┘
//! ```
//!
//! Every operation is scoped to the calling owner.

#[cfg(not(feature = "local-repo"))]
compile_error!("Enable at least one repository backend feature.");

pub mod checksum;
pub mod factory;
pub mod repositories;
pub mod repository;

pub use checksum::{calculate_checksum, ChecksumReader};
pub use factory::{RepositoryFactory, RepositoryType};
pub use repositories::LocalRepository;
pub use repository::{
    AnalysisRepository, ErrorContext, FullRepository, PredictionFilter, PredictionRepository,
    ReportRepository, ReportUpdate, RepositoryError, RepositoryResult,
};

/// Check if the backing store is healthy.
pub async fn health_check<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<bool> {
    repo.health_check().await
}
