//! Network sync audit log
//!
//! One immutable entry per router synchronization attempt. Used to diagnose
//! reconciliation failures; never a source of truth for current access.
//!
//! Stores expose `append` and `query` only: there is no update or delete.

use chrono::{DateTime, Utc};
use hub_common::MemberId;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::SyncLogError;

/// Router-side operation recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Updated,
    Enabled,
    Disabled,
    Kicked,
    PasswordReset,
    Deleted,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Kicked => "kicked",
            Self::PasswordReset => "password_reset",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// Attempt outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Audit record of one sync attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSyncLog {
    pub id: Uuid,
    /// Kept even if the member is later deleted
    pub member_id: Option<MemberId>,
    pub action: SyncAction,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub router_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NetworkSyncLog {
    /// Successful attempt
    pub fn success(member_id: Option<MemberId>, action: SyncAction, router_ip: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            member_id,
            action,
            status: SyncStatus::Success,
            error_message: None,
            metadata: BTreeMap::new(),
            router_ip,
            created_at: Utc::now(),
        }
    }

    /// Failed attempt
    pub fn failure(
        member_id: Option<MemberId>,
        action: SyncAction,
        router_ip: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: SyncStatus::Failed,
            error_message: Some(error.into()),
            ..Self::success(member_id, action, router_ip)
        }
    }

    /// Attach a metadata field before the entry is appended
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }
}

/// Log filter; entries come back newest first
#[derive(Debug, Clone, Default)]
pub struct SyncLogQuery {
    pub member_id: Option<MemberId>,
    pub status: Option<SyncStatus>,
    pub action: Option<SyncAction>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl SyncLogQuery {
    /// Entries for one member
    pub fn for_member(member_id: MemberId) -> Self {
        Self {
            member_id: Some(member_id),
            ..Self::default()
        }
    }

    /// Failed entries only
    pub fn failed() -> Self {
        Self {
            status: Some(SyncStatus::Failed),
            ..Self::default()
        }
    }

    /// Does the entry pass the filter
    pub fn matches(&self, entry: &NetworkSyncLog) -> bool {
        self.member_id.map_or(true, |m| entry.member_id == Some(m))
            && self.status.map_or(true, |s| entry.status == s)
            && self.action.map_or(true, |a| entry.action == a)
            && self.since.map_or(true, |t| entry.created_at >= t)
    }

    fn select<'a, I>(&self, newest_first: I) -> Vec<NetworkSyncLog>
    where
        I: Iterator<Item = &'a NetworkSyncLog>,
    {
        newest_first
            .filter(|e| self.matches(e))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

/// Append-only store of sync attempts
pub trait SyncLogStore: Send + Sync {
    /// Record an attempt
    fn append(&self, entry: NetworkSyncLog) -> Result<(), SyncLogError>;

    /// Filtered entries, newest first
    fn query(&self, query: &SyncLogQuery) -> Result<Vec<NetworkSyncLog>, SyncLogError>;

    /// Total entries
    fn count(&self) -> Result<usize, SyncLogError>;
}

/// In-memory store (tests, dry runs)
#[derive(Debug, Default)]
pub struct InMemorySyncLogStore {
    entries: RwLock<Vec<NetworkSyncLog>>,
}

impl InMemorySyncLogStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in append order
    pub fn entries(&self) -> Vec<NetworkSyncLog> {
        self.entries.read().clone()
    }
}

impl SyncLogStore for InMemorySyncLogStore {
    fn append(&self, entry: NetworkSyncLog) -> Result<(), SyncLogError> {
        self.entries.write().push(entry);
        Ok(())
    }

    fn query(&self, query: &SyncLogQuery) -> Result<Vec<NetworkSyncLog>, SyncLogError> {
        Ok(query.select(self.entries.read().iter().rev()))
    }

    fn count(&self) -> Result<usize, SyncLogError> {
        Ok(self.entries.read().len())
    }
}

/// JSON-lines file store
///
/// Each append writes one line with `O_APPEND`; the file is never rewritten.
#[derive(Debug)]
pub struct JsonlSyncLogStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSyncLogStore {
    /// Store at `path`; parent directories are created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<NetworkSyncLog>, SyncLogError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<NetworkSyncLog>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = line_no + 1,
                        "skipping malformed sync log line: {}",
                        e
                    );
                }
            }
        }
        Ok(entries)
    }
}

impl SyncLogStore for JsonlSyncLogStore {
    fn append(&self, entry: NetworkSyncLog) -> Result<(), SyncLogError> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn query(&self, query: &SyncLogQuery) -> Result<Vec<NetworkSyncLog>, SyncLogError> {
        let entries = self.read_all()?;
        Ok(query.select(entries.iter().rev()))
    }

    fn count(&self) -> Result<usize, SyncLogError> {
        Ok(self.read_all()?.len())
    }
}
