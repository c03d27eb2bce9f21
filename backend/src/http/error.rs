//! HTTP error handling and response types.
//!
//! All service errors cross the HTTP boundary here and nowhere else.

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::services::{ErrorKind, ServiceError};

static INCLUDE_DETAILS: AtomicBool = AtomicBool::new(false);

/// Include the debug rendering of source errors in responses.
///
/// Set once at startup; only enabled in development.
pub fn set_error_details(enabled: bool) {
    INCLUDE_DETAILS.store(enabled, Ordering::Relaxed);
}

fn error_details_enabled() -> bool {
    INCLUDE_DETAILS.load(Ordering::Relaxed)
}

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Any failure raised by the service layer
    Service(ServiceError),
    /// Request carried no owner identity
    Unauthorized(String),
    /// Path, query or body could not be extracted
    Rejected { status: StatusCode, message: String },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::Service(ServiceError::BadRequest(message.into()))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Service(ServiceError::Internal(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Service(e) => StatusCode::from_u16(e.kind().http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Rejected { status, .. } => *status,
        }
    }

    /// Keep size and media-type rejections; everything else is a bad request.
    fn rejected(status: StatusCode, message: String) -> Self {
        let status = match status {
            StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNSUPPORTED_MEDIA_TYPE => status,
            _ => StatusCode::BAD_REQUEST,
        };
        AppError::Rejected { status, message }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::Service(e) => {
                let kind = e.kind();
                if kind == ErrorKind::InternalError {
                    tracing::error!(error = ?e, "Request failed");
                } else {
                    tracing::debug!(code = kind.as_str(), error = %e, "Request rejected");
                }
                let body = ApiError::new(kind.as_str(), e.user_message());
                if error_details_enabled() {
                    body.with_details(format!("{:?}", e))
                } else {
                    body
                }
            }
            AppError::Unauthorized(msg) => ApiError::new("UNAUTHORIZED", msg),
            AppError::Rejected { status, message } => {
                tracing::debug!(status = %status, message = %message, "Request rejected");
                let code = match status {
                    StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
                    StatusCode::UNSUPPORTED_MEDIA_TYPE => "UNSUPPORTED_MEDIA_TYPE",
                    _ => ErrorKind::BadRequest.as_str(),
                };
                ApiError::new(code, message)
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        AppError::Service(err)
    }
}

impl From<crate::db::RepositoryError> for AppError {
    fn from(err: crate::db::RepositoryError) -> Self {
        AppError::Service(err.into())
    }
}

impl From<crate::scoring::CalculatorError> for AppError {
    fn from(err: crate::scoring::CalculatorError) -> Self {
        AppError::Service(err.into())
    }
}

macro_rules! impl_from_rejection {
    ($($rejection:ty),+ $(,)?) => {
        $(
            impl From<$rejection> for AppError {
                fn from(rejection: $rejection) -> Self {
                    AppError::rejected(rejection.status(), rejection.body_text())
                }
            }
        )+
    };
}

impl_from_rejection!(JsonRejection, PathRejection, QueryRejection, MultipartRejection);
