//! Service layer for business logic and orchestration.
//!
//! Services sit between the repository and the HTTP handlers. They own the
//! pipeline (parse, validate, score, persist), the prediction queries and the
//! report lifecycle, and return typed [`ServiceError`]s.

pub mod aggregator;
pub mod error;
pub mod export;
pub mod predictions;
pub mod report_lifecycle;
pub mod upload;

pub use aggregator::{aggregate, time_series, AggregateSummary, HISTOGRAM_EDGES};
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use export::{predictions_to_csv, render_report, PdfDocument, CSV_COLUMNS};
pub use predictions::{
    clamp_page, BatchResults, PredictionPage, PredictionService, PredictionStatistics,
};
pub use report_lifecycle::{
    ReportArtifact, ReportData, ReportLifecycleManager, ReportPage, ReportStatusView,
};
pub use upload::{ScoredBatch, UploadPipeline, UploadResponse, ValidatedBatch};
