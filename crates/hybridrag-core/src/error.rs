//! Error taxonomy shared by every hybridrag crate.
//!
//! Empty corpora are not represented here: searches and evaluations over an
//! empty corpus succeed with empty results.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid chunking parameters, missing connection settings and similar.
    /// Raised before any I/O happens.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding provider failed. Rate-limit failures are retried with
    /// backoff before surfacing; `attempts` counts every request made.
    #[error("embedding provider error after {attempts} attempt(s): {message}")]
    EmbeddingProvider {
        attempts: u32,
        rate_limited: bool,
        message: String,
    },

    /// The vector store could not be reached or rejected the operation.
    /// The index layer never retries these.
    #[error("index connectivity error: {0}")]
    IndexConnectivity(String),

    /// An upsert stopped part way. `committed` points were durably written
    /// before the failing batch, so a caller can resume from there.
    #[error("partial upsert: {committed} point(s) committed, {failed} failed: {message}")]
    PartialUpsert {
        committed: usize,
        failed: usize,
        message: String,
    },

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("sparse index error: {0}")]
    SparseIndex(String),

    #[error("invalid record at line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn connectivity(err: impl std::fmt::Display) -> Self {
        Self::IndexConnectivity(err.to_string())
    }

    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EmbeddingProvider { rate_limited, .. } => *rate_limited,
            Self::IndexConnectivity(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
