//! # HubSpace Network Sync
//!
//! Keeps the hotspot router's user roster in line with members' subscription
//! status.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         hub-netsync                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  EventBus ──► NetworkSyncHandler ──► SyncDispatcher (per member) │
//! │                                            │                     │
//! │  hubctl sync-members ──► Reconciler ───────┤                     │
//! │                                            ▼                     │
//! │                         MemberSyncer (retry + audit log)         │
//! │                                            │                     │
//! │                    RouterClient ◄──────────┘                     │
//! │          ┌─────────────┴──────────────┐                          │
//! │    RouterOsClient (REST)      SimulatedRouter                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Router settings live behind a [`SettingsHandle`]; replacing them is atomic
//! and affects the next operation, never one already running.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod crypto;
pub mod dispatch;
pub mod error;
pub mod member;
pub mod reconcile;
pub mod retry;
pub mod routeros;
pub mod settings;
pub mod simulated;
pub mod syncer;
pub mod username;

use std::sync::Arc;

pub use client::{HotspotUser, RouterClient, RouterIdentity, RouterStatus, UpsertOutcome};
pub use crypto::{MasterKey, MASTER_KEY_ENV};
pub use dispatch::{job_for, NetworkSyncHandler, SyncDispatcher, SyncJob, DEFAULT_SYNC_SHARDS};
pub use error::{RouterError, SyncError, SyncResult};
pub use member::{InMemoryMemberDirectory, MemberDirectory, MemberProfile};
pub use reconcile::{PlannedAction, Reconciler, SweepFailure, SweepOptions, SweepReport};
pub use retry::{Attempted, RetryPolicy};
pub use routeros::RouterOsClient;
pub use settings::{RetrySettings, RouterDriver, RouterSettings, SettingsHandle};
pub use simulated::{RouterCall, RouterOp, SimulatedRouter};
pub use syncer::{MemberSyncer, SyncOutcome};
pub use username::{generate_password, render_username};

/// Router client for the configured driver
pub fn router_for(settings: &SettingsHandle) -> SyncResult<Arc<dyn RouterClient>> {
    match settings.load().driver {
        RouterDriver::Routeros => {
            let client = RouterOsClient::new(settings.clone())
                .map_err(|e| SyncError::Settings(format!("cannot build router client: {}", e)))?;
            Ok(Arc::new(client))
        }
        RouterDriver::Simulated => {
            tracing::warn!("using simulated router, no hotspot is provisioned");
            Ok(Arc::new(SimulatedRouter::default()))
        }
    }
}
