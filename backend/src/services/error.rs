//! Service-level error taxonomy.
//!
//! Every failure crossing the service boundary maps to a stable
//! machine-readable [`ErrorKind`] plus a human-readable message.

use std::fmt;

use crate::api::{ReportId, ReportStatus};
use crate::db::RepositoryError;
use crate::parsing::ParseError;
use crate::scoring::CalculatorError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Stable error kinds exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedInput,
    ConfigurationError,
    BadRequest,
    ServiceUnavailable,
    EndpointNotFound,
    Timeout,
    UpstreamBadRequest,
    InvalidResponseShape,
    Cancelled,
    NotFound,
    Forbidden,
    Conflict,
    ReportNotReady,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedInput => "MALFORMED_INPUT",
            ErrorKind::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::EndpointNotFound => "ENDPOINT_NOT_FOUND",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::UpstreamBadRequest => "UPSTREAM_BAD_REQUEST",
            ErrorKind::InvalidResponseShape => "INVALID_RESPONSE_SHAPE",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::ReportNotReady => "REPORT_NOT_READY",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::MalformedInput | ErrorKind::ConfigurationError | ErrorKind::BadRequest => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict | ErrorKind::ReportNotReady => 409,
            ErrorKind::InternalError => 500,
            ErrorKind::EndpointNotFound
            | ErrorKind::UpstreamBadRequest
            | ErrorKind::InvalidResponseShape => 502,
            ErrorKind::ServiceUnavailable | ErrorKind::Cancelled => 503,
            ErrorKind::Timeout => 504,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every service operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The upload stream could not be decoded. Aborts the whole upload.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Required calculator parameters are missing or unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Calculator(#[from] CalculatorError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Report {id} is not ready for download (status: {status})")]
    ReportNotReady { id: ReportId, status: ReportStatus },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Parse(_) => ErrorKind::MalformedInput,
            ServiceError::Configuration(_) => ErrorKind::ConfigurationError,
            ServiceError::BadRequest(_) => ErrorKind::BadRequest,
            ServiceError::Calculator(e) => match e {
                CalculatorError::Configuration(_) => ErrorKind::ConfigurationError,
                CalculatorError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
                CalculatorError::EndpointNotFound(_) => ErrorKind::EndpointNotFound,
                CalculatorError::Timeout { .. } => ErrorKind::Timeout,
                CalculatorError::BadRequest { .. } => ErrorKind::UpstreamBadRequest,
                CalculatorError::InvalidResponseShape(_) => ErrorKind::InvalidResponseShape,
                CalculatorError::Cancelled => ErrorKind::Cancelled,
            },
            ServiceError::Repository(e) => match e {
                RepositoryError::NotFound { .. } => ErrorKind::NotFound,
                RepositoryError::Forbidden { .. } => ErrorKind::Forbidden,
                RepositoryError::Conflict { .. } => ErrorKind::Conflict,
                RepositoryError::ValidationError { .. } => ErrorKind::BadRequest,
                RepositoryError::ConfigurationError { .. } => ErrorKind::ConfigurationError,
                RepositoryError::ConnectionError { .. } => ErrorKind::ServiceUnavailable,
                RepositoryError::TimeoutError { .. } => ErrorKind::Timeout,
                RepositoryError::InternalError { .. } => ErrorKind::InternalError,
            },
            ServiceError::ReportNotReady { .. } => ErrorKind::ReportNotReady,
            ServiceError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Message safe to show to end users.
    ///
    /// Repository context and internal details are left out.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Repository(e) => e.message().to_string(),
            ServiceError::Internal(_) => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }
}
