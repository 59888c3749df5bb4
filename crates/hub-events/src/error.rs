//! Error types for the fan-out and audit log

use thiserror::Error;

/// A subscriber failed to react to an event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Reaction failed
    #[error("handler failed: {0}")]
    Failed(String),
    /// Reaction could not be queued
    #[error("handler unavailable: {0}")]
    Unavailable(String),
}

/// Audit log storage errors
#[derive(Error, Debug)]
pub enum SyncLogError {
    /// Log file IO
    #[error("sync log IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Entry (de)serialization
    #[error("sync log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
