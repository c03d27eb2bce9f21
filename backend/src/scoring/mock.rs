//! Deterministic stand-in for the remote scoring model.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::error::CalculatorError;
use super::index::{score_sample, IndexResult};
use super::strategy::{IndexStrategy, ServiceHealth};
use crate::api::{CalculatorParameters, RiskCategory, Sample};

pub const MOCK_MODEL_NAME: &str = "mock-pollution-model-v1.0";

/// Scores with the mean-of-metals function after an artificial delay.
///
/// Always succeeds and always reports healthy.
#[derive(Debug, Clone)]
pub struct MockIndexStrategy {
    latency: Duration,
}

impl MockIndexStrategy {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    /// Mock without simulated latency, for tests.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Default for MockIndexStrategy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

#[async_trait]
impl IndexStrategy for MockIndexStrategy {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn compute(
        &self,
        samples: &[Sample],
        parameters: &CalculatorParameters,
    ) -> Result<IndexResult, CalculatorError> {
        tracing::debug!(samples = samples.len(), strategy = "mock", "Scoring batch");
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let timestamp = Utc::now().to_rfc3339();
        let mut counts = [0usize; 3];
        let mut total = 0.0;

        let processed_data = samples
            .iter()
            .enumerate()
            .map(|(i, sample)| {
                let hmpi = score_sample(sample, &parameters.metals);
                let category = RiskCategory::from_score(hmpi);
                counts[category as usize] += 1;
                total += hmpi;

                let mut row = Map::new();
                row.insert("sampleId".into(), json!(sample.id));
                for metal in &parameters.metals {
                    row.insert(metal.clone(), json!(sample.concentration(metal).unwrap_or(0.0)));
                }
                row.insert("HMPI".into(), json!(hmpi));
                row.insert("Quality".into(), json!(category.as_str()));
                row.insert("Note".into(), json!(format!("Mock Data - Sample {}", i + 1)));
                row.insert("timestamp".into(), json!(timestamp));
                Value::Object(row)
            })
            .collect();

        let mean = if samples.is_empty() {
            0.0
        } else {
            total / samples.len() as f64
        };

        Ok(IndexResult {
            processed_data,
            summary: json!({
                "meanIndices": { "HMPI": mean },
                "categoryCounts": {
                    "safe": counts[RiskCategory::Safe as usize],
                    "caution": counts[RiskCategory::Caution as usize],
                    "unsafe": counts[RiskCategory::Unsafe as usize],
                },
                "totalSamples": samples.len(),
            }),
            metadata: json!({
                "model": MOCK_MODEL_NAME,
                "version": "1.0.0",
                "timestamp": timestamp,
            }),
            extra: Map::new(),
        })
    }

    async fn health_check(&self) -> ServiceHealth {
        ServiceHealth::healthy("mock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SampleId;
    use std::collections::BTreeMap;

    fn sample(lead: f64, arsenic: f64) -> Sample {
        Sample {
            id: SampleId::new(),
            latitude: 1.0,
            longitude: 2.0,
            date: Utc::now(),
            metal_concentrations: BTreeMap::from([
                ("lead".to_string(), lead),
                ("arsenic".to_string(), arsenic),
            ]),
        }
    }

    #[tokio::test]
    async fn test_mock_scores_are_deterministic() {
        let strategy = MockIndexStrategy::instant();
        let params = CalculatorParameters::for_metals(["lead", "arsenic"]);
        let samples = vec![sample(200.0, 100.0), sample(10.0, 20.0)];

        let first = strategy.compute(&samples, &params).await.unwrap();
        let second = strategy.compute(&samples, &params).await.unwrap();

        assert_eq!(first.hmpi_at(0), Some(150.0));
        assert_eq!(first.hmpi_at(1), Some(15.0));
        assert_eq!(first.hmpi_at(0), second.hmpi_at(0));
        assert_eq!(first.processed_data[0]["Quality"], "unsafe");
        assert_eq!(first.summary["categoryCounts"]["safe"], 1);
        assert_eq!(first.summary["totalSamples"], 2);
        assert_eq!(first.metadata["model"], MOCK_MODEL_NAME);
    }

    #[tokio::test]
    async fn test_mock_latency_is_applied() {
        let strategy = MockIndexStrategy::new(Duration::from_millis(50));
        let params = CalculatorParameters::for_metals(["lead"]);
        let start = std::time::Instant::now();
        strategy.compute(&[sample(1.0, 1.0)], &params).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_mock_always_healthy() {
        let health = MockIndexStrategy::default().health_check().await;
        assert!(health.is_healthy());
        assert_eq!(health.service, "mock");
    }
}
