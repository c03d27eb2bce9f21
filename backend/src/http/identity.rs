//! Owner identity extraction.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! user id in the `x-user-id` header.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::error::AppError;
use crate::api::OwnerId;

pub const OWNER_HEADER: &str = "x-user-id";

/// The caller every request is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdentity(pub OwnerId);

impl<S> FromRequestParts<S> for OwnerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
        Ok(OwnerIdentity(OwnerId::new(value)))
    }
}
