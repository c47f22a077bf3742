//! Error types for the measurement pipeline

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stage of a measurement cycle, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Identity,
    ServerSelection,
    Latency,
    Download,
    Upload,
    Commit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Identity => "identity",
            Phase::ServerSelection => "server selection",
            Phase::Latency => "latency",
            Phase::Download => "download",
            Phase::Upload => "upload",
            Phase::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Failure reported by a measurement provider call
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Failure of a Result Store operation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid stored timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("No measurement stored yet")]
    NotFound,

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Failure of one measurement cycle. Any variant means nothing was committed.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Provider error during {stage}: {source}")]
    Provider {
        stage: Phase,
        #[source]
        source: ProviderError,
    },

    #[error("Server {0} not found")]
    ServerNotFound(String),

    #[error("No server available")]
    NoServerAvailable,

    #[error("Measurement failed in {phase} phase: {source}")]
    MeasurementFailed {
        phase: Phase,
        #[source]
        source: ProviderError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl RunError {
    /// Phase in which the cycle stopped
    pub fn phase(&self) -> Phase {
        match self {
            RunError::Provider { stage, .. } => *stage,
            RunError::ServerNotFound(_) | RunError::NoServerAvailable => Phase::ServerSelection,
            RunError::MeasurementFailed { phase, .. } => *phase,
            RunError::Store(_) => Phase::Commit,
        }
    }
}
