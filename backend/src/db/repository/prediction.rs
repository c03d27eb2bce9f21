//! Prediction repository trait and query filter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::RepositoryResult;
use crate::api::{AnalysisId, GeoPoint, OwnerId, PredictionId, PredictionResult};

/// Conjunctive filter over an owner's predictions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionFilter {
    /// Inclusive lower bound on the sample date.
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the sample date.
    pub date_to: Option<DateTime<Utc>>,
    /// Center and radius in kilometres.
    pub near: Option<(GeoPoint, f64)>,
    pub analysis_id: Option<AnalysisId>,
    pub limit: Option<usize>,
}

impl PredictionFilter {
    pub fn matches(&self, prediction: &PredictionResult) -> bool {
        if let Some(from) = self.date_from {
            if prediction.date < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if prediction.date > to {
                return false;
            }
        }
        if let Some((center, radius_km)) = &self.near {
            if center.distance_km(&prediction.location) > *radius_km {
                return false;
            }
        }
        if let Some(analysis_id) = self.analysis_id {
            if prediction.analysis_id != Some(analysis_id) {
                return false;
            }
        }
        true
    }
}

/// Repository trait for scored samples.
///
/// Predictions are append-only; the only mutation is deletion by the owner.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait PredictionRepository: Send + Sync {
    /// Store a batch atomically. Returns the number stored.
    async fn store_predictions(
        &self,
        owner: &OwnerId,
        predictions: Vec<PredictionResult>,
    ) -> RepositoryResult<usize>;

    /// Fetch one prediction owned by `owner`.
    async fn get_prediction(
        &self,
        owner: &OwnerId,
        id: PredictionId,
    ) -> RepositoryResult<PredictionResult>;

    /// Fetch predictions by id, in the order given.
    ///
    /// Fails with `NotFound` if any id is unknown or not owned by `owner`.
    async fn get_predictions(
        &self,
        owner: &OwnerId,
        ids: &[PredictionId],
    ) -> RepositoryResult<Vec<PredictionResult>>;

    /// One page of predictions, newest first, plus the owner's total.
    async fn list_predictions(
        &self,
        owner: &OwnerId,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<(Vec<PredictionResult>, usize)>;

    /// Predictions matching `filter`, newest first.
    async fn query_predictions(
        &self,
        owner: &OwnerId,
        filter: &PredictionFilter,
    ) -> RepositoryResult<Vec<PredictionResult>>;

    /// Predictions produced by one upload, in sample order.
    async fn predictions_for_analysis(
        &self,
        owner: &OwnerId,
        analysis_id: AnalysisId,
    ) -> RepositoryResult<Vec<PredictionResult>>;

    /// Delete one prediction owned by `owner`.
    async fn delete_prediction(&self, owner: &OwnerId, id: PredictionId) -> RepositoryResult<()>;
}
