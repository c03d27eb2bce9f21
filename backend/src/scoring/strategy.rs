//! Scoring strategy interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::CalculatorError;
use super::index::IndexResult;
use crate::api::{CalculatorParameters, Sample};

/// Outcome of a strategy health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health report of the active scoring strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    /// Strategy name (`mock` or `remote`).
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ServiceHealth {
    pub fn healthy(service: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            service: service.into(),
            endpoint: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn unhealthy(service: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            error: Some(error.into()),
            ..Self::healthy(service)
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// A way of turning validated samples into pollution indices.
///
/// Exactly one strategy is active per process.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; one instance serves all requests.
#[async_trait]
pub trait IndexStrategy: Send + Sync {
    /// Short name used in logs and health output.
    fn name(&self) -> &'static str;

    /// Score a batch. `samples` is never empty.
    async fn compute(
        &self,
        samples: &[Sample],
        parameters: &CalculatorParameters,
    ) -> Result<IndexResult, CalculatorError>;

    /// Probe whether the strategy can currently serve requests.
    async fn health_check(&self) -> ServiceHealth;
}
