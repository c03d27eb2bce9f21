//! Errors raised by the index calculator.

/// Terminal failure of a calculator call.
///
/// The remote variants are distinct so callers can tell a dead service from a
/// bad request or a broken response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalculatorError {
    /// The calculator or its strategy is misconfigured.
    #[error("Scoring configuration error: {0}")]
    Configuration(String),

    /// HTTP 5xx or connection refused.
    #[error("Calculation service is temporarily unavailable: {0}")]
    ServiceUnavailable(String),

    /// The configured host could not be resolved.
    #[error("Calculation service endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("Request to calculation service timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// HTTP 4xx. Not retryable.
    #[error("Calculation service rejected the request (HTTP {status}): {message}")]
    BadRequest { status: u16, message: String },

    /// Success status with an empty or unexpected body.
    #[error("Invalid response from calculation service: {0}")]
    InvalidResponseShape(String),

    #[error("Calculation was cancelled")]
    Cancelled,
}

impl CalculatorError {
    /// Whether repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CalculatorError::ServiceUnavailable(_) | CalculatorError::Timeout { .. }
        )
    }
}
