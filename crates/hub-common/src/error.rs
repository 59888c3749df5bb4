//! Error types for shared job primitives

use thiserror::Error;

/// Run-lock errors
#[derive(Error, Debug)]
pub enum LockError {
    /// Lock file could not be read or written
    #[error("lock IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sharded worker errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Workers were shut down
    #[error("workers '{0}' are shut down")]
    Closed(String),
}
