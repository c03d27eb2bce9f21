//! HTTP server module for the HMPI backend.
//!
//! An axum-based REST API over the service layer. Handlers only translate
//! between HTTP and service calls; errors are mapped to responses in one
//! place ([`error::AppError`]).
//!
//! Routes live under `/v1`, with `/health` at the root.

pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod identity;
pub mod router;
pub mod state;

pub use error::{set_error_details, ApiError, AppError};
pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use identity::{OwnerIdentity, OWNER_HEADER};
pub use router::create_router;
pub use state::AppState;
