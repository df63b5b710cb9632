//! Error types for the cluster index builder.

use quadcluster_types::QuadKeyError;
use std::fmt;
use thiserror::Error;

/// Stage of a build run, used to label fatal errors and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Copying points from the source into the backing store.
    Load,
    /// Worker pool assigning points to buckets.
    Assignment,
    /// Reducing buckets into per-zoom aggregates.
    Aggregation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Load => "load",
            Phase::Assignment => "assignment",
            Phase::Aggregation => "aggregation",
        })
    }
}

/// Fatal errors of a build run. None of these are retried: a run that fails
/// must be restarted from scratch, which is safe because bucket inserts are
/// idempotent.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{phase}: store failure at {key}: {message}")]
    StoreIo {
        phase: Phase,
        key: String,
        message: String,
    },

    #[error("aggregation: invariant violation: bucket {key} has no members")]
    InvariantViolation { key: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{phase}: worker {worker} panicked")]
    WorkerPanicked { phase: Phase, worker: usize },

    #[error("source error: {0}")]
    Source(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid snapshot format")]
    InvalidFormat,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    pub fn store(phase: Phase, key: impl fmt::Display, message: impl Into<String>) -> Self {
        ClusterError::StoreIo {
            phase,
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Failure reported by a backing store primitive. The pipeline attaches the
/// phase when it escalates one into [`ClusterError::StoreIo`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key}: {message}")]
pub struct StoreError {
    pub key: String,
    pub message: String,
}

impl StoreError {
    pub fn new(key: impl fmt::Display, message: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn in_phase(self, phase: Phase) -> ClusterError {
        ClusterError::StoreIo {
            phase,
            key: self.key,
            message: self.message,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;

/// Structured rejection of a serving-layer lookup. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl LookupError {
    /// HTTP-style status the serving layer conventionally maps this to.
    pub fn status_code(&self) -> u16 {
        match self {
            LookupError::NotFound(_) => 404,
            LookupError::BadRequest(_) => 400,
            LookupError::Unavailable(_) => 503,
        }
    }
}

impl From<StoreError> for LookupError {
    fn from(err: StoreError) -> Self {
        LookupError::Unavailable(err.to_string())
    }
}

impl From<QuadKeyError> for LookupError {
    fn from(err: QuadKeyError) -> Self {
        match err {
            QuadKeyError::Empty => LookupError::NotFound(err.to_string()),
            QuadKeyError::TooLong { .. } | QuadKeyError::InvalidDigit { .. } => {
                LookupError::BadRequest(err.to_string())
            }
        }
    }
}
