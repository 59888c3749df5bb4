//! HubSpace Common - Shared types for the membership core
//!
//! This crate provides the primitives every other crate builds on:
//! - Identifiers and polymorphic entity references
//! - Subscription status and desired network access
//! - Domain events emitted by the lifecycle engine
//! - Clocks (system and manual)
//! - Ordered sharded workers for per-key sequential processing
//! - Job run-locks for mutually exclusive sweeps
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        HUBSPACE CORE                             │
//! │                                                                  │
//! │  ┌────────────────┐   DomainEvent   ┌──────────────────────────┐ │
//! │  │ Lifecycle      │ ──────────────► │ Event Fan-out            │ │
//! │  │ Engine         │                 │ (hub-events)             │ │
//! │  │ (hub-billing)  │                 └────────────┬─────────────┘ │
//! │  └────────────────┘                              │               │
//! │                                                  ▼               │
//! │  ┌────────────────┐   SyncJob      ┌──────────────────────────┐  │
//! │  │ Router Client  │ ◄───────────── │ Reconciliation Scheduler │  │
//! │  │ (RouterOS)     │                │ (hub-netsync)            │  │
//! │  └────────────────┘                └────────────┬─────────────┘  │
//! │                                                 ▼                │
//! │                                    NetworkSyncLog (audit)        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod events;
pub mod ids;
pub mod runlock;
pub mod status;
pub mod workers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{LockError, WorkerError};
pub use events::{DomainEvent, EventMetadata, InvoiceSettlement, SubscriptionTransition};
pub use ids::{EntityKind, EntityRef, IdError, InvoiceId, MemberId, PlanId, SubscriptionId};
pub use runlock::{FileRunLock, InMemoryRunLock, RunGuard, RunLock};
pub use status::{desired_access, DesiredAccess, SubscriptionStatus};
pub use workers::ShardedWorkers;

/// Job name of the periodic subscription lifecycle sweep
pub const LIFECYCLE_JOB: &str = "process-subscription-lifecycle";

/// Job name of the periodic full router reconciliation
pub const ROUTER_SYNC_JOB: &str = "sync-members-to-router";
