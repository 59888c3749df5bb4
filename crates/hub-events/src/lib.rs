//! HubSpace Event Fan-out and Audit Log
//!
//! Decouples the lifecycle engine from its reactions and keeps a durable
//! trail of every router synchronization attempt.
//!
//! # Architecture
//!
//! ```text
//! LifecycleEngine ──publish──► EventBus ──shard(subscription)──► handlers
//!                                              ├─ LoggingHandler
//!                                              ├─ NetworkSyncHandler (hub-netsync)
//!                                              └─ EventRecorder
//!
//! MemberSyncer ──append──► SyncLogStore (in-memory | JSON lines)
//! ```
//!
//! # Guarantees
//!
//! - Events of one subscription reach every handler in publish order
//! - A failing handler never stops the others
//! - Publishing never rolls back or blocks the committed transition
//! - Sync log entries are append-only

#![warn(missing_docs)]

pub mod bus;
pub mod error;
pub mod logging;
pub mod recorder;
pub mod sync_log;

pub use bus::{EventBus, EventBusBuilder, EventHandler, EventPublisher};
pub use error::{HandlerError, SyncLogError};
pub use logging::LoggingHandler;
pub use recorder::EventRecorder;
pub use sync_log::{
    InMemorySyncLogStore, JsonlSyncLogStore, NetworkSyncLog, SyncAction, SyncLogQuery,
    SyncLogStore, SyncStatus,
};
