//! Error types for the analysis layer.

use serde::Serialize;
use smartdo_core::{StoreError, TaskId};
use thiserror::Error;

use crate::client::Backend;

/// Why a completion produced no text.
///
/// Display strings start with "Error" so they double as the marker text an
/// enhanced description carries when the backend is down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Network failure, timeout or non-2xx status.
    #[error("Error querying {backend}: {reason}")]
    Unavailable { backend: Backend, reason: String },

    #[error("Error querying {backend}: malformed response body: {reason}")]
    MalformedBody { backend: Backend, reason: String },

    #[error("Error querying hosted API: API key not configured")]
    MissingCredential,
}

/// Per-task pipeline failure. Batch runs record these per item.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PipelineError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("store error: {0}")]
    Store(String),

    #[error("cancelled before start")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        PipelineError::Store(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded for '{caller}'; retry in {retry_after_secs}s")]
    Exceeded { caller: String, retry_after_secs: u64 },
}

/// What `AiService` callers can see.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
