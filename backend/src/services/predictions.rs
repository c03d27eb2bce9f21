//! Prediction queries and single-sample scoring.
//!
//! Scores are computed once when a prediction is created and read back
//! unchanged afterwards.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::aggregator::{aggregate, AggregateSummary};
use super::error::{ServiceError, ServiceResult};
use crate::api::{
    AnalysisId, CalculatorParameters, GeoPoint, OwnerId, PredictionId, PredictionResult,
    RiskCategory, SampleInput,
};
use crate::db::{AnalysisRepository, FullRepository, PredictionFilter, PredictionRepository};
use crate::preprocessing::SampleValidator;
use crate::scoring::IndexCalculator;

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 500;
pub const DEFAULT_LATEST_LIMIT: usize = 10;
const RECENT_IN_STATISTICS: usize = 5;

/// One page of predictions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionPage {
    pub predictions: Vec<PredictionResult>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

/// Results of one upload with their aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResults {
    pub results: Vec<PredictionResult>,
    pub summary: AggregateSummary,
}

/// Owner-wide statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionStatistics {
    pub total_predictions: usize,
    pub safe_count: usize,
    pub caution_count: usize,
    pub unsafe_count: usize,
    pub safe_percentage: f64,
    pub caution_percentage: f64,
    pub unsafe_percentage: f64,
    #[serde(rename = "averageHMPI")]
    pub average_hmpi: f64,
    pub recent_predictions: Vec<PredictionResult>,
}

/// Normalize a 1-based page request: page at least 1, limit in `1..=500`.
pub fn clamp_page(page: Option<usize>, limit: Option<usize>) -> (usize, usize) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    (page, limit)
}

#[derive(Clone)]
pub struct PredictionService {
    repository: Arc<dyn FullRepository>,
    calculator: IndexCalculator,
    default_metals: Vec<String>,
}

impl PredictionService {
    pub fn new(
        repository: Arc<dyn FullRepository>,
        calculator: IndexCalculator,
        default_metals: Vec<String>,
    ) -> Self {
        Self {
            repository,
            calculator,
            default_metals,
        }
    }

    /// Validate, score and persist one sample.
    pub async fn score_single(
        &self,
        owner: &OwnerId,
        input: SampleInput,
        cancel: &CancellationToken,
    ) -> ServiceResult<PredictionResult> {
        let validator = SampleValidator::new(&CalculatorParameters::for_metals(
            self.default_metals.iter().cloned(),
        ));
        let sample = validator
            .validate_input(input, Utc::now())
            .map_err(|reasons| ServiceError::BadRequest(reasons.join("; ")))?;

        // Extra metals on the sample take part in its score.
        let metals: Vec<String> = sample.metal_concentrations.keys().cloned().collect();
        let parameters = CalculatorParameters::for_metals(metals);
        let index = self
            .calculator
            .compute(std::slice::from_ref(&sample), &parameters, cancel)
            .await?;
        let score = index.scores_for(std::slice::from_ref(&sample), &parameters.metals)[0];

        let prediction = PredictionResult::from_sample(&sample, score, None);
        self.repository
            .store_predictions(owner, vec![prediction.clone()])
            .await?;
        tracing::debug!(
            owner = %owner,
            prediction_id = %prediction.id,
            score,
            "Scored single sample"
        );
        Ok(prediction)
    }

    pub async fn get(&self, owner: &OwnerId, id: PredictionId) -> ServiceResult<PredictionResult> {
        Ok(self.repository.get_prediction(owner, id).await?)
    }

    pub async fn list(
        &self,
        owner: &OwnerId,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> ServiceResult<PredictionPage> {
        let (page, limit) = clamp_page(page, limit);
        let offset = (page - 1).saturating_mul(limit);
        let (predictions, total) = self
            .repository
            .list_predictions(owner, offset, limit)
            .await?;
        Ok(PredictionPage {
            predictions,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Predictions within `radius_km` of a point.
    pub async fn by_location(
        &self,
        owner: &OwnerId,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    ) -> ServiceResult<Vec<PredictionResult>> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(ServiceError::BadRequest(
                "Latitude or longitude out of range".to_string(),
            ));
        }
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(ServiceError::BadRequest(
                "Radius must be a positive number of kilometres".to_string(),
            ));
        }
        let filter = PredictionFilter {
            near: Some((GeoPoint::new(latitude, longitude), radius_km)),
            ..Default::default()
        };
        Ok(self.repository.query_predictions(owner, &filter).await?)
    }

    /// Predictions whose sample date lies within `[start, end]`.
    pub async fn by_date_range(
        &self,
        owner: &OwnerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ServiceResult<Vec<PredictionResult>> {
        if start > end {
            return Err(ServiceError::BadRequest(
                "startDate must not be after endDate".to_string(),
            ));
        }
        let filter = PredictionFilter {
            date_from: Some(start),
            date_to: Some(end),
            ..Default::default()
        };
        Ok(self.repository.query_predictions(owner, &filter).await?)
    }

    /// Most recently created predictions.
    pub async fn latest(&self, owner: &OwnerId, limit: Option<usize>) -> ServiceResult<Vec<PredictionResult>> {
        let limit = limit.unwrap_or(DEFAULT_LATEST_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        let (predictions, _) = self.repository.list_predictions(owner, 0, limit).await?;
        Ok(predictions)
    }

    /// All predictions of one upload, with their aggregate.
    ///
    /// The upload must belong to `owner`.
    pub async fn batch(&self, owner: &OwnerId, upload_id: AnalysisId) -> ServiceResult<BatchResults> {
        self.repository.get_analysis(owner, upload_id).await?;
        let results = self
            .repository
            .predictions_for_analysis(owner, upload_id)
            .await?;
        let summary = aggregate(&results);
        Ok(BatchResults { results, summary })
    }

    pub async fn statistics(&self, owner: &OwnerId) -> ServiceResult<PredictionStatistics> {
        let all = self
            .repository
            .query_predictions(owner, &PredictionFilter::default())
            .await?;
        let summary = aggregate(&all);
        let (recent, _) = self
            .repository
            .list_predictions(owner, 0, RECENT_IN_STATISTICS)
            .await?;

        Ok(PredictionStatistics {
            total_predictions: summary.total,
            safe_count: summary.count(RiskCategory::Safe),
            caution_count: summary.count(RiskCategory::Caution),
            unsafe_count: summary.count(RiskCategory::Unsafe),
            safe_percentage: summary.percentage(RiskCategory::Safe),
            caution_percentage: summary.percentage(RiskCategory::Caution),
            unsafe_percentage: summary.percentage(RiskCategory::Unsafe),
            average_hmpi: summary.average_hmpi,
            recent_predictions: recent,
        })
    }

    pub async fn delete(&self, owner: &OwnerId, id: PredictionId) -> ServiceResult<()> {
        self.repository.delete_prediction(owner, id).await?;
        tracing::info!(owner = %owner, prediction_id = %id, "Deleted prediction");
        Ok(())
    }
}
