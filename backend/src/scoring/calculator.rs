//! Index calculator front-end.
//!
//! Wraps the strategy chosen at startup and adds cancellation.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::CalculatorError;
use super::index::IndexResult;
use super::mock::MockIndexStrategy;
use super::remote::RemoteIndexStrategy;
use super::strategy::{IndexStrategy, ServiceHealth};
use crate::api::{CalculatorParameters, Sample};
use crate::config::{ScoringConfig, ScoringMode};

/// Computes pollution indices with the process-wide strategy.
#[derive(Clone)]
pub struct IndexCalculator {
    strategy: Arc<dyn IndexStrategy>,
}

impl IndexCalculator {
    pub fn new(strategy: Arc<dyn IndexStrategy>) -> Self {
        Self { strategy }
    }

    /// Select the strategy from configuration. Called once at startup.
    pub fn from_config(config: &ScoringConfig) -> Result<Self, CalculatorError> {
        let strategy: Arc<dyn IndexStrategy> = match config.mode {
            ScoringMode::Mock => Arc::new(MockIndexStrategy::new(Duration::from_millis(
                config.mock_latency_ms,
            ))),
            ScoringMode::Remote => {
                let endpoint = config.endpoint_url.as_deref().ok_or_else(|| {
                    CalculatorError::Configuration(
                        "scoring.endpoint_url is required in remote mode".to_string(),
                    )
                })?;
                Arc::new(RemoteIndexStrategy::new(
                    endpoint,
                    Duration::from_millis(config.timeout_ms),
                    Duration::from_millis(config.health_timeout_ms),
                )?)
            }
        };
        tracing::info!(strategy = strategy.name(), "Index calculator initialized");
        Ok(Self::new(strategy))
    }

    /// Instant mock calculator.
    pub fn mock() -> Self {
        Self::new(Arc::new(MockIndexStrategy::instant()))
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Score `samples`, giving up with `Cancelled` as soon as `cancel` fires.
    ///
    /// An empty batch returns an empty result without calling the strategy.
    pub async fn compute(
        &self,
        samples: &[Sample],
        parameters: &CalculatorParameters,
        cancel: &CancellationToken,
    ) -> Result<IndexResult, CalculatorError> {
        if samples.is_empty() {
            return Ok(IndexResult::default());
        }
        if cancel.is_cancelled() {
            return Err(CalculatorError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(samples = samples.len(), "Scoring cancelled by caller");
                Err(CalculatorError::Cancelled)
            }
            result = self.strategy.compute(samples, parameters) => result,
        }
    }

    pub async fn health_check(&self) -> ServiceHealth {
        self.strategy.health_check().await
    }
}

impl std::fmt::Debug for IndexCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCalculator")
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SampleId;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn one_sample() -> Vec<Sample> {
        vec![Sample {
            id: SampleId::new(),
            latitude: 0.0,
            longitude: 0.0,
            date: Utc::now(),
            metal_concentrations: BTreeMap::from([("lead".to_string(), 60.0)]),
        }]
    }

    #[tokio::test]
    async fn test_empty_batch_skips_strategy() {
        let calc = IndexCalculator::new(Arc::new(MockIndexStrategy::new(Duration::from_secs(60))));
        let result = calc
            .compute(&[], &CalculatorParameters::for_metals(["lead"]), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.processed_data.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_slow_strategy() {
        let calc = IndexCalculator::new(Arc::new(MockIndexStrategy::new(Duration::from_secs(60))));
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = calc
            .compute(&one_sample(), &CalculatorParameters::for_metals(["lead"]), &token)
            .await
            .unwrap_err();
        assert_eq!(err, CalculatorError::Cancelled);
    }

    #[tokio::test]
    async fn test_already_cancelled_token() {
        let token = CancellationToken::new();
        token.cancel();
        let err = IndexCalculator::mock()
            .compute(&one_sample(), &CalculatorParameters::for_metals(["lead"]), &token)
            .await
            .unwrap_err();
        assert_eq!(err, CalculatorError::Cancelled);
    }

    #[test]
    fn test_from_config_selects_strategy() {
        let mut config = ScoringConfig::default();
        assert_eq!(IndexCalculator::from_config(&config).unwrap().strategy_name(), "mock");

        config.mode = ScoringMode::Remote;
        config.endpoint_url = None;
        assert!(matches!(
            IndexCalculator::from_config(&config),
            Err(CalculatorError::Configuration(_))
        ));

        config.endpoint_url = Some("http://127.0.0.1:9/predict".to_string());
        assert_eq!(IndexCalculator::from_config(&config).unwrap().strategy_name(), "remote");
    }
}
