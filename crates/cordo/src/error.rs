//! Coordinator error taxonomy.
//!
//! Every failure surfaced at a boundary carries one of these kinds; the API
//! layer maps them to HTTP statuses and a structured body. Repositories stay
//! on `anyhow` and fold into `Internal` unless a service promotes them.

use thiserror::Error;

/// Domain errors with wire-visible kinds.
#[derive(Debug, Error)]
pub enum CoordError {
    /// Parameters failed schema validation, a placeholder did not resolve,
    /// demands conflicted, or a blueprint reference was bad.
    #[error("{0}")]
    Validation(String),

    /// Second executor bind for the same session.
    #[error("session {0} is already bound to an executor")]
    AlreadyBound(String),

    /// A new run was requested for a session that already has a non-terminal
    /// run.
    #[error("session {0} already has an active run")]
    ActiveRunExists(String),

    /// A pending run expired without any satisfying runner claiming it.
    #[error("no matching runner claimed run {0} before the timeout")]
    NoMatchingRunner(String),

    /// The runner holding this run was removed from the registry.
    #[error("runner {runner_id} was removed while holding run {run_id}")]
    RunnerLost { runner_id: String, run_id: String },

    /// The executor exhausted its retry budget validating agent output.
    #[error("agent output failed schema validation: {0}")]
    OutputSchemaValidation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoordError {
    /// Stable kind string used in error responses and session records.
    pub fn kind(&self) -> &'static str {
        match self {
            CoordError::Validation(_) => "ValidationError",
            CoordError::AlreadyBound(_) => "AlreadyBound",
            CoordError::ActiveRunExists(_) => "ActiveRunExists",
            CoordError::NoMatchingRunner(_) => "NoMatchingRunner",
            CoordError::RunnerLost { .. } => "RunnerLost",
            CoordError::OutputSchemaValidation(_) => "OutputSchemaValidationError",
            CoordError::NotFound(_) => "NotFound",
            CoordError::Conflict(_) => "Conflict",
            CoordError::Internal(_) => "Internal",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

/// Result alias for coordinator operations.
pub type CoordResult<T> = Result<T, CoordError>;
