// Error taxonomy for the retrieval pipeline
use serde::Serialize;
use thiserror::Error;

/// Errors that fail a whole call. Input errors are raised before any request is sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("no PVs specified")]
    NoPvs,

    /// The point-in-time lookup is a single request for all PVs.
    #[error("point-in-time lookup failed: {0}")]
    Lookup(#[from] FetchError),
}

/// Per-PV fetch failure. Always confined to the result slot of one PV.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    #[error("request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("archive returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("malformed response: {message}")]
    MalformedResponse { message: String },
}

impl FetchError {
    pub fn malformed(message: impl Into<String>) -> Self {
        FetchError::MalformedResponse {
            message: message.into(),
        }
    }
}
