//! Application state for the HTTP server.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::FullRepository;
use crate::scoring::IndexCalculator;
use crate::services::{PredictionService, ReportLifecycleManager, UploadPipeline};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository instance for persistence
    pub repository: Arc<dyn FullRepository>,
    /// Index calculator selected at startup
    pub calculator: IndexCalculator,
    pub uploads: UploadPipeline,
    pub predictions: PredictionService,
    pub reports: ReportLifecycleManager,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire the services around one repository and calculator.
    pub fn new(
        repository: Arc<dyn FullRepository>,
        calculator: IndexCalculator,
        config: AppConfig,
    ) -> Self {
        let uploads = UploadPipeline::new(
            repository.clone(),
            calculator.clone(),
            config.scoring.workers,
        );
        let predictions = PredictionService::new(
            repository.clone(),
            calculator.clone(),
            config.scoring.default_metals.clone(),
        );
        let reports = ReportLifecycleManager::new(repository.clone());
        Self {
            repository,
            calculator,
            uploads,
            predictions,
            reports,
            config: Arc::new(config),
        }
    }
}
