//! Unified API error handling with structured responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::error::CoordError;

/// API-boundary error: a domain error plus its HTTP rendition.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub CoordError);

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(CoordError::not_found(msg))
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(CoordError::validation(msg))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self(CoordError::conflict(msg))
    }

    fn status_code(&self) -> StatusCode {
        match &self.0 {
            CoordError::Validation(_) => StatusCode::BAD_REQUEST,
            CoordError::AlreadyBound(_)
            | CoordError::ActiveRunExists(_)
            | CoordError::Conflict(_) => StatusCode::CONFLICT,
            CoordError::NotFound(_) => StatusCode::NOT_FOUND,
            // Only ever surfaced on session records, but mapped here too in
            // case a handler returns them directly.
            CoordError::NoMatchingRunner(_)
            | CoordError::RunnerLost { .. }
            | CoordError::OutputSchemaValidation(_) => StatusCode::CONFLICT,
            CoordError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(CoordError::Internal(err))
    }
}

/// Structured error response: `{kind, message, details?}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.0.kind();
        let message = self.0.to_string();

        match &self.0 {
            CoordError::Internal(err) => {
                error!(error_kind = kind, "API error: {err:#}");
            }
            CoordError::RunnerLost { .. } | CoordError::NoMatchingRunner(_) => {
                warn!(error_kind = kind, message = %message, "dispatch error");
            }
            _ => {
                debug!(error_kind = kind, message = %message, "client error");
            }
        }

        let body = ErrorResponse {
            kind,
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            ApiError(CoordError::validation("x")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(CoordError::AlreadyBound("ses_a".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(CoordError::ActiveRunExists("ses_a".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::not_found("session ses_a").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(CoordError::Internal(anyhow::anyhow!("boom"))).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_body_carries_the_kind() {
        let err = ApiError(CoordError::AlreadyBound("ses_a".into()));
        assert_eq!(err.0.kind(), "AlreadyBound");
    }
}
