//! Repository trait definitions for the persistence gateway.
//!
//! Responsibilities are split across focused traits:
//!
//! - [`error`]: Error types for repository operations
//! - [`analysis`]: Upload records
//! - [`prediction`]: Scored samples and queries over them
//! - [`report`]: Report records, artifacts, templates and schedules
//!
//! Every operation is scoped to an [`OwnerId`](crate::api::OwnerId).
//!
//! # Convenience Trait Bound
//!
//! Services that need everything take the [`FullRepository`] bound:
//!
//! ```ignore
//! async fn my_service<R: FullRepository + ?Sized>(repo: &R, owner: &OwnerId) -> RepositoryResult<()> {
//!     let runs = repo.list_analyses(owner).await?;
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod error;
pub mod prediction;
pub mod report;

// Re-export error types
pub use error::{ErrorContext, RepositoryError, RepositoryResult};

// Re-export all traits
pub use analysis::AnalysisRepository;
pub use prediction::{PredictionFilter, PredictionRepository};
pub use report::{ReportRepository, ReportUpdate};

/// Composite trait bound for a complete repository implementation.
///
/// Automatically implemented for any type that implements all three
/// repository traits.
pub trait FullRepository: AnalysisRepository + PredictionRepository + ReportRepository {}

impl<T> FullRepository for T where T: AnalysisRepository + PredictionRepository + ReportRepository {}
