//! Router client abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// Hotspot user record to create or update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotspotUser {
    pub username: String,
    pub password: String,
    pub profile: Option<String>,
    pub server: Option<String>,
    pub comment: Option<String>,
}

/// Result of an idempotent upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// No record existed
    Created,
    /// Existing record rewritten and re-enabled
    Updated,
}

/// Router identity answered by the connectivity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterIdentity {
    pub name: String,
}

/// Snapshot for operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStatus {
    pub host: String,
    pub identity: String,
    pub online_users: u32,
}

/// Hotspot operations on the router
///
/// Every call blocks on network I/O; callers bound it with a timeout and
/// must not hold engine locks while awaiting.
#[async_trait]
pub trait RouterClient: Send + Sync {
    /// Identity query used as connectivity check
    async fn test_connection(&self) -> Result<RouterIdentity, RouterError>;

    /// Create or update a hotspot user and leave it enabled
    async fn upsert_hotspot_user(&self, user: &HotspotUser) -> Result<UpsertOutcome, RouterError>;

    /// Disable a hotspot user; `false` when no such user exists
    async fn disable_user(&self, username: &str) -> Result<bool, RouterError>;

    /// Terminate active sessions; `false` when none was active
    async fn kick_session(&self, username: &str) -> Result<bool, RouterError>;

    /// Number of active hotspot sessions
    async fn online_count(&self) -> Result<u32, RouterError>;

    /// Delete a hotspot user; `false` when no such user exists
    async fn remove_user(&self, username: &str) -> Result<bool, RouterError>;

    /// Change a hotspot user's password
    async fn set_password(&self, username: &str, password: &str) -> Result<(), RouterError>;
}
