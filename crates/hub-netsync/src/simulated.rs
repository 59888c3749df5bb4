//! In-process simulated router
//!
//! Keeps a hotspot user table and active sessions in memory, records every
//! call, and can be told to fail specific operations. Selected with
//! `driver = "simulated"` for staging setups without hardware.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::client::{HotspotUser, RouterClient, RouterIdentity, UpsertOutcome};
use crate::error::RouterError;

/// Router operation, for call records and fault matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterOp {
    TestConnection,
    Upsert,
    Disable,
    Kick,
    OnlineCount,
    Remove,
    SetPassword,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterCall {
    pub op: RouterOp,
    pub username: Option<String>,
}

/// Hotspot user as stored by the simulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedUser {
    pub username: String,
    pub password: String,
    pub profile: Option<String>,
    pub server: Option<String>,
    pub comment: Option<String>,
    pub disabled: bool,
}

#[derive(Debug)]
struct Fault {
    op: RouterOp,
    username: Option<String>,
    error: RouterError,
    /// `None` fails forever
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct SimState {
    users: BTreeMap<String, SimulatedUser>,
    sessions: Vec<String>,
    faults: Vec<Fault>,
    calls: Vec<RouterCall>,
    unreachable: bool,
}

/// Simulated hotspot router
#[derive(Debug)]
pub struct SimulatedRouter {
    identity: String,
    latency: Duration,
    state: Mutex<SimState>,
}

impl Default for SimulatedRouter {
    fn default() -> Self {
        Self::new("simulated-router")
    }
}

impl SimulatedRouter {
    /// Reachable router with no users
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            latency: Duration::ZERO,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every call fail with a connection error
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Fail every `op` call
    pub fn fail(&self, op: RouterOp, error: RouterError) {
        self.push_fault(op, None, error, None);
    }

    /// Fail the next `times` calls of `op`
    pub fn fail_times(&self, op: RouterOp, error: RouterError, times: u32) {
        self.push_fault(op, None, error, Some(times));
    }

    /// Fail every `op` call for one username
    pub fn fail_for(&self, op: RouterOp, username: &str, error: RouterError) {
        self.push_fault(op, Some(username.to_string()), error, None);
    }

    /// Drop all injected faults
    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    fn push_fault(&self, op: RouterOp, username: Option<String>, error: RouterError, remaining: Option<u32>) {
        self.state.lock().faults.push(Fault {
            op,
            username,
            error,
            remaining,
        });
    }

    /// Open an active session for a user
    pub fn start_session(&self, username: &str) {
        self.state.lock().sessions.push(username.to_string());
    }

    /// Stored user
    pub fn user(&self, username: &str) -> Option<SimulatedUser> {
        self.state.lock().users.get(username).cloned()
    }

    /// Number of stored users
    pub fn user_count(&self) -> usize {
        self.state.lock().users.len()
    }

    /// Whether a user has an active session
    pub fn has_session(&self, username: &str) -> bool {
        self.state.lock().sessions.iter().any(|s| s == username)
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<RouterCall> {
        self.state.lock().calls.clone()
    }

    /// Calls of one operation
    pub fn call_count(&self, op: RouterOp) -> usize {
        self.state.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Record the call and return the injected error, if any
    async fn enter(&self, op: RouterOp, username: Option<&str>) -> Result<(), RouterError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state.lock();
        state.calls.push(RouterCall {
            op,
            username: username.map(str::to_string),
        });
        if state.unreachable {
            return Err(RouterError::Connection(format!("{} unreachable", self.identity)));
        }

        let hit = state.faults.iter().position(|f| {
            f.op == op
                && f.remaining != Some(0)
                && f.username.as_deref().map_or(true, |u| Some(u) == username)
        });
        match hit {
            Some(idx) => {
                let fault = &mut state.faults[idx];
                if let Some(left) = fault.remaining.as_mut() {
                    *left -= 1;
                }
                Err(fault.error.clone())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RouterClient for SimulatedRouter {
    async fn test_connection(&self) -> Result<RouterIdentity, RouterError> {
        self.enter(RouterOp::TestConnection, None).await?;
        Ok(RouterIdentity {
            name: self.identity.clone(),
        })
    }

    async fn upsert_hotspot_user(&self, user: &HotspotUser) -> Result<UpsertOutcome, RouterError> {
        self.enter(RouterOp::Upsert, Some(&user.username)).await?;
        let record = SimulatedUser {
            username: user.username.clone(),
            password: user.password.clone(),
            profile: user.profile.clone(),
            server: user.server.clone(),
            comment: user.comment.clone(),
            disabled: false,
        };
        let previous = self.state.lock().users.insert(user.username.clone(), record);
        Ok(if previous.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    async fn disable_user(&self, username: &str) -> Result<bool, RouterError> {
        self.enter(RouterOp::Disable, Some(username)).await?;
        let mut state = self.state.lock();
        match state.users.get_mut(username) {
            Some(user) => {
                user.disabled = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn kick_session(&self, username: &str) -> Result<bool, RouterError> {
        self.enter(RouterOp::Kick, Some(username)).await?;
        let mut state = self.state.lock();
        let before = state.sessions.len();
        state.sessions.retain(|s| s != username);
        Ok(state.sessions.len() != before)
    }

    async fn online_count(&self) -> Result<u32, RouterError> {
        self.enter(RouterOp::OnlineCount, None).await?;
        Ok(u32::try_from(self.state.lock().sessions.len()).unwrap_or(u32::MAX))
    }

    async fn remove_user(&self, username: &str) -> Result<bool, RouterError> {
        self.enter(RouterOp::Remove, Some(username)).await?;
        let mut state = self.state.lock();
        state.sessions.retain(|s| s != username);
        Ok(state.users.remove(username).is_some())
    }

    async fn set_password(&self, username: &str, password: &str) -> Result<(), RouterError> {
        self.enter(RouterOp::SetPassword, Some(username)).await?;
        let mut state = self.state.lock();
        let user = state
            .users
            .get_mut(username)
            .ok_or_else(|| RouterError::NotFound(format!("hotspot user {}", username)))?;
        user.password = password.to_string();
        Ok(())
    }
}
