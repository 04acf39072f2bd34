//! Errors surfaced by the core, and how they are presented over HTTP.
//!
//! Every [`CoreError`] has a stable [`CoreError::reason`] string which callers
//! may match on. Diagnostic detail from the store never reaches a response; it
//! is logged where it is converted into [`CoreError::StoreUnavailable`].

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// The kind of resource an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Tournament,
    Team,
    Match,
    User,
    Route,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Tournament => "tournament",
            Resource::Team => "team",
            Resource::Match => "match",
            Resource::User => "user",
            Resource::Route => "API route",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(Resource),
    #[error("invalid {0} id")]
    InvalidIdentifier(Resource),
    #[error("{field}: {reason}")]
    ValidationFailed {
        field: &'static str,
        reason: String,
    },
    #[error("{0}")]
    Conflict(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("store unavailable")]
    StoreUnavailable,
    #[error("internal error")]
    Internal,
}

impl CoreError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        CoreError::ValidationFailed {
            field,
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            CoreError::NotAuthenticated => "not_authenticated",
            CoreError::Forbidden => "forbidden",
            CoreError::NotFound(_) => "not_found",
            CoreError::InvalidIdentifier(_) => "invalid_identifier",
            CoreError::ValidationFailed { .. } => "validation_failed",
            CoreError::Conflict(_) => "conflict",
            CoreError::InvalidCredentials => "invalid_credentials",
            CoreError::StoreUnavailable => "store_unavailable",
            CoreError::Internal => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::NotAuthenticated | CoreError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            CoreError::Forbidden => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::InvalidIdentifier(_)
            | CoreError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let body = match &self {
            CoreError::ValidationFailed { field, reason } => json!({
                "error": self.reason(),
                "field": field,
                "message": reason,
            }),
            _ => json!({
                "error": self.reason(),
                "message": self.to_string(),
            }),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Failures of the document store. These carry diagnostic text and must be
/// converted into a [`CoreError`] before leaving the core.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "store operation failed");
        CoreError::StoreUnavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_do_not_leak_detail() {
        let e: CoreError =
            StoreError::Unavailable("connection refused at 10.0.0.3".into())
                .into();
        assert_eq!(e, CoreError::StoreUnavailable);
        assert_eq!(e.reason(), "store_unavailable");
        assert!(!e.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn status_codes() {
        assert_eq!(CoreError::NotAuthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(CoreError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            CoreError::InvalidIdentifier(Resource::Match).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::Conflict("team name already exists".into()).status(),
            StatusCode::CONFLICT
        );
    }
}
