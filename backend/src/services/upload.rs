//! CSV upload pipeline: parse, validate, score, persist.
//!
//! Split into [`UploadPipeline::ingest`] and [`UploadPipeline::score`] so a
//! validated batch survives a failed scoring call and can be scored again
//! without re-reading the file.

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;

use super::error::{ServiceError, ServiceResult};
use crate::api::{
    AnalysisId, AnalysisResults, AnalysisRun, CalculatorParameters, OwnerId, ParameterSet,
    PredictionResult, Sample,
};
use crate::db::{AnalysisRepository, ChecksumReader, FullRepository, PredictionRepository};
use crate::parsing::{parse_reader, TextEncoding};
use crate::preprocessing::{SampleValidator, ValidationOutcome, MAX_REPORTED_ERRORS};
use crate::scoring::{score_sample, IndexCalculator, IndexResult};

/// Client-facing result of one upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub upload_id: AnalysisId,
    pub samples_count: usize,
    pub valid_samples: usize,
    pub invalid_samples: usize,
    /// First row errors, at most [`MAX_REPORTED_ERRORS`].
    pub errors: Vec<String>,
}

/// A parsed and validated upload that has not been scored yet.
#[derive(Debug, Clone)]
pub struct ValidatedBatch {
    pub owner: OwnerId,
    pub file_name: String,
    pub checksum: String,
    pub parameters: CalculatorParameters,
    pub outcome: ValidationOutcome,
}

/// Calculator output plus the final per-sample scores, in sample order.
#[derive(Debug, Clone)]
pub struct ScoredBatch {
    pub index: IndexResult,
    pub scores: Vec<f64>,
}

#[derive(Clone)]
pub struct UploadPipeline {
    repository: Arc<dyn FullRepository>,
    calculator: IndexCalculator,
    workers: usize,
}

impl UploadPipeline {
    pub fn new(
        repository: Arc<dyn FullRepository>,
        calculator: IndexCalculator,
        workers: usize,
    ) -> Self {
        Self {
            repository,
            calculator,
            workers: workers.max(1),
        }
    }

    /// Resolve parameters, then parse and validate `bytes` in one streaming pass.
    pub fn ingest(
        owner: OwnerId,
        file_name: impl Into<String>,
        bytes: &[u8],
        parameters: ParameterSet,
    ) -> ServiceResult<ValidatedBatch> {
        Self::ingest_reader(owner, file_name, bytes, parameters)
    }

    /// Resolve parameters, then parse, validate and checksum `reader` as it
    /// is read. Blocks on `reader`.
    ///
    /// Missing parameters fail with a configuration error before any byte is
    /// read; an undecodable stream fails the whole upload.
    pub fn ingest_reader<R: Read>(
        owner: OwnerId,
        file_name: impl Into<String>,
        reader: R,
        parameters: ParameterSet,
    ) -> ServiceResult<ValidatedBatch> {
        let parameters = parameters.resolve().map_err(ServiceError::Configuration)?;
        let validator = SampleValidator::new(&parameters);
        let mut reader = ChecksumReader::new(reader);
        let outcome = validator.validate(parse_reader(&mut reader, TextEncoding::Utf8)?)?;

        Ok(ValidatedBatch {
            owner,
            file_name: file_name.into(),
            checksum: reader.checksum(),
            parameters,
            outcome,
        })
    }

    /// Score the valid samples of `batch`.
    ///
    /// Calculator errors are returned unchanged and nothing is persisted.
    pub async fn score(
        &self,
        batch: &ValidatedBatch,
        cancel: &CancellationToken,
    ) -> ServiceResult<ScoredBatch> {
        let samples = &batch.outcome.valid_samples;
        let index = self
            .calculator
            .compute(samples, &batch.parameters, cancel)
            .await?;
        let scores = self
            .score_samples(samples, &batch.parameters.metals, &index)
            .await?;
        Ok(ScoredBatch { index, scores })
    }

    /// Per-sample scores over at most `workers` blocking chunks at a time.
    async fn score_samples(
        &self,
        samples: &[Sample],
        metals: &[String],
        index: &IndexResult,
    ) -> ServiceResult<Vec<f64>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        let chunk_size = samples.len().div_ceil(self.workers);
        let metals: Arc<[String]> = metals.into();
        let reported: Arc<Vec<Option<f64>>> =
            Arc::new((0..samples.len()).map(|i| index.hmpi_at(i)).collect());

        // Owned work list; the buffered stream must not borrow `samples`.
        let work: Vec<(usize, Vec<Sample>)> = samples
            .chunks(chunk_size)
            .enumerate()
            .map(|(n, chunk)| (n * chunk_size, chunk.to_vec()))
            .collect();

        let chunks: Vec<Vec<f64>> = stream::iter(work)
            .map(move |(offset, chunk)| {
                let metals = Arc::clone(&metals);
                let reported = Arc::clone(&reported);
                tokio::task::spawn_blocking(move || {
                    chunk
                        .iter()
                        .enumerate()
                        .map(|(i, sample)| {
                            reported[offset + i].unwrap_or_else(|| score_sample(sample, &metals))
                        })
                        .collect::<Vec<f64>>()
                })
            })
            .buffered(self.workers)
            .map_err(|e| ServiceError::Internal(format!("Scoring task failed: {}", e)))
            .try_collect()
            .await?;

        Ok(chunks.into_iter().flatten().collect())
    }

    /// Persist the analysis run and then its predictions.
    ///
    /// If the predictions cannot be stored the run is removed again, so a
    /// failed persist leaves nothing behind.
    pub async fn persist(
        &self,
        batch: ValidatedBatch,
        scored: Option<ScoredBatch>,
    ) -> ServiceResult<UploadResponse> {
        let run_id = AnalysisId::new();
        let ValidatedBatch {
            owner,
            file_name,
            checksum,
            parameters,
            outcome,
        } = batch;

        let response = UploadResponse {
            upload_id: run_id,
            samples_count: outcome.total_rows(),
            valid_samples: outcome.valid_count(),
            invalid_samples: outcome.invalid_count(),
            errors: outcome.error_messages(MAX_REPORTED_ERRORS),
        };

        let (results, predictions) = match scored {
            Some(ScoredBatch { index, scores }) => {
                let predictions: Vec<PredictionResult> = outcome
                    .valid_samples
                    .iter()
                    .zip(scores)
                    .map(|(sample, score)| PredictionResult::from_sample(sample, score, Some(run_id)))
                    .collect();
                (AnalysisResults::Scored { index }, predictions)
            }
            None => (
                AnalysisResults::ValiditySummary {
                    valid_samples: response.valid_samples,
                    invalid_samples: response.invalid_samples,
                    processed_at: Utc::now(),
                },
                Vec::new(),
            ),
        };

        self.repository
            .store_analysis(AnalysisRun {
                id: run_id,
                owner: owner.clone(),
                file_name,
                checksum,
                input_parameters: parameters,
                samples_count: response.samples_count,
                valid_samples: response.valid_samples,
                invalid_samples: response.invalid_samples,
                results,
                created_at: Utc::now(),
            })
            .await?;

        if predictions.is_empty() {
            return Ok(response);
        }
        if let Err(e) = self.repository.store_predictions(&owner, predictions).await {
            if let Err(rollback) = self.repository.delete_analysis(&owner, run_id).await {
                tracing::error!(
                    upload_id = %run_id,
                    error = %rollback,
                    "Failed to remove analysis run after prediction store failure"
                );
            }
            return Err(e.into());
        }

        Ok(response)
    }

    /// Run the whole pipeline for one in-memory file.
    pub async fn upload(
        &self,
        owner: OwnerId,
        file_name: String,
        bytes: Vec<u8>,
        parameters: ParameterSet,
        cancel: &CancellationToken,
    ) -> ServiceResult<UploadResponse> {
        tracing::debug!(bytes = bytes.len(), "Buffered upload");
        self.upload_reader(owner, file_name, Cursor::new(bytes), parameters, cancel)
            .await
    }

    /// Run the whole pipeline over an async byte source.
    ///
    /// Rows are parsed and validated on a blocking thread while `reader` is
    /// still producing bytes; the file is never held in memory as a whole.
    pub async fn upload_reader<R>(
        &self,
        owner: OwnerId,
        file_name: String,
        reader: R,
        parameters: ParameterSet,
        cancel: &CancellationToken,
    ) -> ServiceResult<UploadResponse>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tracing::info!(owner = %owner, file = %file_name, "Processing upload");

        let reader = SyncIoBridge::new(reader);
        let batch = tokio::task::spawn_blocking(move || {
            Self::ingest_reader(owner, file_name, reader, parameters)
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("Ingest task failed: {}", e)))??;

        let scored = if batch.outcome.valid_count() == 0 {
            tracing::warn!(
                owner = %batch.owner,
                invalid = batch.outcome.invalid_count(),
                "Upload has no valid samples; skipping calculator"
            );
            None
        } else {
            match self.score(&batch, cancel).await {
                Ok(scored) => Some(scored),
                Err(e) => {
                    tracing::error!(
                        owner = %batch.owner,
                        samples = batch.outcome.valid_count(),
                        strategy = self.calculator.strategy_name(),
                        error = %e,
                        "Scoring failed; nothing persisted"
                    );
                    return Err(e);
                }
            }
        };

        let response = self.persist(batch, scored).await?;
        tracing::info!(
            upload_id = %response.upload_id,
            valid = response.valid_samples,
            invalid = response.invalid_samples,
            "Upload stored"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{calculate_checksum, AnalysisRepository, LocalRepository, PredictionRepository};
    use tokio::io::AsyncWriteExt;
    use std::collections::BTreeMap;

    fn params(metals: &[&str]) -> ParameterSet {
        ParameterSet {
            metals: Some(metals.iter().map(|m| m.to_string()).collect()),
            standards: Some(BTreeMap::new()),
            backgrounds: Some(BTreeMap::new()),
            presence_limits: Some(BTreeMap::new()),
        }
    }

    fn pipeline(workers: usize) -> (Arc<LocalRepository>, UploadPipeline) {
        let repo = Arc::new(LocalRepository::new());
        let pipeline = UploadPipeline::new(repo.clone(), IndexCalculator::mock(), workers);
        (repo, pipeline)
    }

    #[test]
    fn test_ingest_rejects_missing_parameters_before_parsing() {
        let err = UploadPipeline::ingest(
            OwnerId::new("a"),
            "x.csv",
            b"\xff\xfe not csv",
            ParameterSet::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }

    #[test]
    fn test_ingest_records_checksum() {
        let bytes = b"latitude,longitude,lead\n1,2,3\n";
        let batch =
            UploadPipeline::ingest(OwnerId::new("a"), "x.csv", bytes, params(&["lead"])).unwrap();
        assert_eq!(batch.checksum, calculate_checksum(bytes));
        assert_eq!(batch.outcome.valid_count(), 1);
    }

    #[tokio::test]
    async fn test_scores_keep_sample_order_across_workers() {
        let csv: String = std::iter::once("latitude,longitude,lead\n".to_string())
            .chain((0..23).map(|i| format!("0,0,{}\n", i * 10)))
            .collect();
        let (repo, pipeline) = pipeline(4);
        let owner = OwnerId::new("a");
        let response = pipeline
            .upload(
                owner.clone(),
                "s.csv".into(),
                csv.into_bytes(),
                params(&["lead"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.valid_samples, 23);

        let mut stored = repo
            .predictions_for_analysis(&owner, response.upload_id)
            .await
            .unwrap();
        stored.sort_by(|a, b| a.hmpi_score.total_cmp(&b.hmpi_score));
        let scores: Vec<f64> = stored.iter().map(|p| p.hmpi_score).collect();
        let expected: Vec<f64> = (0..23).map(|i| (i * 10) as f64).collect();
        assert_eq!(scores, expected);
    }

    #[tokio::test]
    async fn test_all_invalid_upload_stores_validity_summary() {
        let (repo, pipeline) = pipeline(2);
        let owner = OwnerId::new("a");
        let response = pipeline
            .upload(
                owner.clone(),
                "bad.csv".into(),
                b"latitude,longitude,lead\n,,1\nx,y,2\n".to_vec(),
                params(&["lead"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.samples_count, 2);
        assert_eq!(response.valid_samples, 0);
        assert_eq!(repo.prediction_count(), 0);

        let run = repo.get_analysis(&owner, response.upload_id).await.unwrap();
        assert!(matches!(
            run.results,
            AnalysisResults::ValiditySummary {
                valid_samples: 0,
                invalid_samples: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_upload_persists_nothing() {
        let (repo, pipeline) = pipeline(2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pipeline
            .upload(
                OwnerId::new("a"),
                "s.csv".into(),
                b"latitude,longitude,lead\n1,2,3\n".to_vec(),
                params(&["lead"]),
                &cancel,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::services::ErrorKind::Cancelled);
        assert_eq!(repo.prediction_count(), 0);
        assert!(repo.list_analyses(&OwnerId::new("a")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_capped() {
        let csv: String = std::iter::once("latitude,longitude,lead\n".to_string())
            .chain((0..15).map(|_| "nope,0,1\n".to_string()))
            .collect();
        let (_, pipeline) = pipeline(1);
        let response = pipeline
            .upload(
                OwnerId::new("a"),
                "s.csv".into(),
                csv.into_bytes(),
                params(&["lead"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.invalid_samples, 15);
        assert_eq!(response.errors.len(), MAX_REPORTED_ERRORS);
    }

    #[tokio::test]
    async fn test_reader_upload_consumes_bytes_as_they_arrive() {
        let (repo, pipeline) = pipeline(2);
        let owner = OwnerId::new("a");
        let (mut writer, reader) = tokio::io::duplex(16);
        let csv = b"latitude,longitude,lead\n1,2,30\n3,4,60\n,5,1\n".to_vec();
        let expected_checksum = calculate_checksum(&csv);

        // The pipe holds 16 bytes, so the writer only finishes if rows are
        // consumed while the upload is still arriving.
        let feeder = tokio::spawn(async move {
            for piece in csv.chunks(5) {
                writer.write_all(piece).await.unwrap();
            }
        });
        let response = pipeline
            .upload_reader(
                owner.clone(),
                "piped.csv".into(),
                reader,
                params(&["lead"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        feeder.await.unwrap();

        assert_eq!(response.samples_count, 3);
        assert_eq!(response.valid_samples, 2);
        assert_eq!(response.invalid_samples, 1);
        let run = repo.get_analysis(&owner, response.upload_id).await.unwrap();
        assert_eq!(run.checksum, expected_checksum);
        assert_eq!(repo.prediction_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_prediction_store_removes_run() {
        let (repo, pipeline) = pipeline(1);
        let owner = OwnerId::new("a");
        repo.fail_operation("store_predictions", true);

        let err = pipeline
            .upload(
                owner.clone(),
                "s.csv".into(),
                b"latitude,longitude,lead\n1,2,3\n".to_vec(),
                params(&["lead"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::services::ErrorKind::ServiceUnavailable);
        assert!(repo.list_analyses(&owner).await.unwrap().is_empty());
        assert_eq!(repo.prediction_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_run_store_stores_no_predictions() {
        let (repo, pipeline) = pipeline(1);
        let owner = OwnerId::new("a");
        repo.fail_operation("store_analysis", true);

        let result = pipeline
            .upload(
                owner.clone(),
                "s.csv".into(),
                b"latitude,longitude,lead\n1,2,3\n".to_vec(),
                params(&["lead"]),
                &CancellationToken::new(),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(repo.prediction_count(), 0);
    }
}
