//! Error types for router access and member sync

use hub_common::MemberId;
use hub_events::SyncAction;
use std::time::Duration;
use thiserror::Error;

/// Single router call failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// Router could not be reached
    #[error("connection failed: {0}")]
    Connection(String),
    /// Credentials rejected
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Router answered with an error status
    #[error("router error {status}: {message}")]
    Router {
        /// HTTP status
        status: u16,
        /// Router-provided message
        message: String,
    },
    /// No answer within the configured timeout
    #[error("router call timed out after {0:?}")]
    Timeout(Duration),
    /// Referenced hotspot record does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// Answer could not be understood
    #[error("invalid router response: {0}")]
    InvalidResponse(String),
}

impl RouterError {
    /// Worth another attempt under the retry policy
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidResponse(_) | Self::NotFound(_))
    }
}

/// Member sync and reconciliation errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// Connectivity check before a batch failed
    #[error("router unreachable: {0}")]
    RouterUnreachable(#[source] RouterError),

    /// Router call still failing after the retry budget
    #[error("{action} failed for member {member_id} after {attempts} attempt(s): {source}")]
    RouterOperationFailed {
        /// Affected member
        member_id: MemberId,
        /// Operation attempted
        action: SyncAction,
        /// Attempts made
        attempts: u32,
        /// Last router error
        source: RouterError,
    },

    /// Router settings unusable
    #[error("settings error: {0}")]
    Settings(String),

    /// Credential encryption
    #[error("credential error: {0}")]
    Crypto(&'static str),

    /// Hotspot username could not be rendered
    #[error("username error: {0}")]
    Username(String),

    /// Member lookup or update failed
    #[error("member directory error: {0}")]
    Directory(String),

    /// Unknown member
    #[error("member not found: {0}")]
    MemberNotFound(MemberId),
}

/// Result alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
