//! HTTP client for an external scoring model.
//!
//! Protocol: `POST <endpoint>` with `{"data": [samples, parameters], "timeout": ms}`;
//! a successful response looks like `{"data": [{"processedData": [...], "summary": {...}}]}`.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::error::Error as StdError;
use std::time::Duration;

use super::error::CalculatorError;
use super::index::IndexResult;
use super::strategy::{IndexStrategy, ServiceHealth};
use crate::api::{CalculatorParameters, Sample};

/// Longest slice of an error body echoed back in a `BadRequest`.
const MAX_ERROR_BODY: usize = 512;

/// Scores samples by calling a remote model. No retries.
#[derive(Debug, Clone)]
pub struct RemoteIndexStrategy {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    health_timeout: Duration,
}

impl RemoteIndexStrategy {
    /// Build a strategy for `endpoint`.
    ///
    /// Fails with `Configuration` when the endpoint is blank or not a URL.
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        health_timeout: Duration,
    ) -> Result<Self, CalculatorError> {
        let endpoint = endpoint.into().trim().to_string();
        if endpoint.is_empty() {
            return Err(CalculatorError::Configuration(
                "Remote scoring requires an endpoint URL".to_string(),
            ));
        }
        reqwest::Url::parse(&endpoint).map_err(|e| {
            CalculatorError::Configuration(format!("Invalid scoring endpoint '{}': {}", endpoint, e))
        })?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("hmpi-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CalculatorError::Configuration(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
            health_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Health probe URL: the endpoint with `/predict` swapped for `/health`.
    pub fn health_url(&self) -> String {
        if self.endpoint.contains("/predict") {
            self.endpoint.replacen("/predict", "/health", 1)
        } else {
            self.endpoint.clone()
        }
    }

    fn classify(&self, err: reqwest::Error) -> CalculatorError {
        if err.is_timeout() {
            return CalculatorError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            };
        }
        if is_connection_refused(&err) {
            return CalculatorError::ServiceUnavailable(
                "Unable to connect to the calculation service".to_string(),
            );
        }
        if is_dns_failure(&err) {
            return CalculatorError::EndpointNotFound(self.endpoint.clone());
        }
        if err.is_decode() || err.is_body() {
            return CalculatorError::InvalidResponseShape(err.to_string());
        }
        CalculatorError::ServiceUnavailable(err.to_string())
    }
}

fn error_chain(err: &reqwest::Error) -> impl Iterator<Item = &(dyn StdError + 'static)> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    std::iter::from_fn(move || {
        let this = current?;
        current = this.source();
        Some(this)
    })
}

fn is_connection_refused(err: &reqwest::Error) -> bool {
    error_chain(err).any(|e| {
        e.downcast_ref::<std::io::Error>()
            .map(|io| io.kind() == std::io::ErrorKind::ConnectionRefused)
            .unwrap_or(false)
    })
}

fn is_dns_failure(err: &reqwest::Error) -> bool {
    error_chain(err).any(|e| {
        let text = e.to_string().to_lowercase();
        text.contains("dns error") || text.contains("failed to lookup address")
    })
}

/// Pull the `data[0]` object out of a response body.
fn extract_result(body: &[u8]) -> Result<IndexResult, CalculatorError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(CalculatorError::InvalidResponseShape(
            "Empty response from calculation model".to_string(),
        ));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| CalculatorError::InvalidResponseShape(format!("Body is not JSON: {}", e)))?;

    let first = value
        .get("data")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .filter(|item| item.is_object())
        .ok_or_else(|| {
            CalculatorError::InvalidResponseShape(
                "Expected a non-empty 'data' array of objects".to_string(),
            )
        })?;

    if !first.get("processedData").map(Value::is_array).unwrap_or(false) {
        return Err(CalculatorError::InvalidResponseShape(
            "Result is missing the 'processedData' array".to_string(),
        ));
    }

    serde_json::from_value(first.clone())
        .map_err(|e| CalculatorError::InvalidResponseShape(e.to_string()))
}

#[async_trait]
impl IndexStrategy for RemoteIndexStrategy {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn compute(
        &self,
        samples: &[Sample],
        parameters: &CalculatorParameters,
    ) -> Result<IndexResult, CalculatorError> {
        tracing::info!(
            samples = samples.len(),
            endpoint = %self.endpoint,
            strategy = "remote",
            "Calling scoring model"
        );

        let payload = json!({
            "data": [samples, parameters],
            "timeout": self.timeout.as_millis() as u64,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "Scoring model returned server error");
            return Err(CalculatorError::ServiceUnavailable(format!(
                "Calculation service returned HTTP {}",
                status.as_u16()
            )));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(CalculatorError::BadRequest {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let mut result = extract_result(&body)?;

        if result.metadata.is_null() {
            result.metadata = json!({
                "apiEndpoint": self.endpoint,
                "timestamp": Utc::now().to_rfc3339(),
            });
        }
        tracing::info!(
            processed = result.processed_data.len(),
            "Received result from scoring model"
        );
        Ok(result)
    }

    async fn health_check(&self) -> ServiceHealth {
        let url = self.health_url();
        let probe = self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match probe {
            Ok(_) => ServiceHealth::healthy("remote").with_endpoint(&self.endpoint),
            Err(e) => {
                tracing::warn!(error = %e, endpoint = %url, "Scoring model health probe failed");
                ServiceHealth::unhealthy("remote", e.to_string()).with_endpoint(&self.endpoint)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_endpoint() {
        let err = RemoteIndexStrategy::new("  ", Duration::from_secs(1), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, CalculatorError::Configuration(_)));
    }

    #[test]
    fn test_rejects_non_url_endpoint() {
        let err = RemoteIndexStrategy::new(
            "YOUR_API_ENDPOINT_HERE",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, CalculatorError::Configuration(_)));
    }

    #[test]
    fn test_health_url_replaces_predict() {
        let strategy = RemoteIndexStrategy::new(
            "http://model.local/api/predict",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(strategy.health_url(), "http://model.local/api/health");
    }

    #[test]
    fn test_extract_result_shapes() {
        assert!(matches!(
            extract_result(b""),
            Err(CalculatorError::InvalidResponseShape(_))
        ));
        assert!(matches!(
            extract_result(b"<html>"),
            Err(CalculatorError::InvalidResponseShape(_))
        ));
        assert!(matches!(
            extract_result(br#"{"data": []}"#),
            Err(CalculatorError::InvalidResponseShape(_))
        ));
        assert!(matches!(
            extract_result(br#"{"data": [{"summary": {}}]}"#),
            Err(CalculatorError::InvalidResponseShape(_))
        ));
        let ok = extract_result(br#"{"data": [{"processedData": [{"HMPI": 12.5}], "summary": {}}]}"#)
            .unwrap();
        assert_eq!(ok.hmpi_at(0), Some(12.5));
    }
}
