//! In-process event bus
//!
//! The subscription table is built once at startup from explicit
//! `subscribe` calls. Delivery runs on [`ShardedWorkers`] keyed by the
//! event's aggregate id, so one subscription's events stay ordered while
//! different subscriptions fan out in parallel.

use async_trait::async_trait;
use futures::FutureExt;
use hub_common::{DomainEvent, ShardedWorkers};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::HandlerError;

/// Default number of delivery shards
pub const DEFAULT_SHARDS: usize = 4;

/// Sink for domain events
///
/// Publishing is fire-and-forget: the transition that produced the event is
/// already committed and must not wait on or be undone by subscribers.
pub trait EventPublisher: Send + Sync {
    /// Publish one event
    fn publish(&self, event: DomainEvent);
}

/// Subscriber reacting to domain events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Filter; defaults to every event
    fn interested_in(&self, event: &DomainEvent) -> bool {
        let _ = event;
        true
    }

    /// React to an event
    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}

#[derive(Debug, Default)]
struct BusStats {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Builder collecting the subscription table
pub struct EventBusBuilder {
    handlers: Vec<Arc<dyn EventHandler>>,
    shards: usize,
}

impl EventBusBuilder {
    /// Register a handler; handlers run in registration order
    pub fn subscribe(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Number of delivery shards
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards.max(1);
        self
    }

    /// Spawn delivery workers; requires a tokio runtime
    pub fn build(self) -> EventBus {
        let handlers: Arc<Vec<Arc<dyn EventHandler>>> = Arc::new(self.handlers);
        let stats = Arc::new(BusStats::default());

        let names: Vec<String> = handlers.iter().map(|h| h.name().to_string()).collect();
        tracing::info!(handlers = ?names, shards = self.shards, "event bus started");

        let worker_handlers = handlers.clone();
        let worker_stats = stats.clone();
        let workers = ShardedWorkers::spawn("event-bus", self.shards, move |event: DomainEvent| {
            let handlers = worker_handlers.clone();
            let stats = worker_stats.clone();
            async move { deliver(&handlers, &stats, event).await }
        });

        EventBus {
            handlers,
            workers,
            stats,
        }
    }
}

async fn deliver(handlers: &[Arc<dyn EventHandler>], stats: &BusStats, event: DomainEvent) {
    for handler in handlers.iter().filter(|h| h.interested_in(&event)) {
        match AssertUnwindSafe(handler.handle(&event)).catch_unwind().await {
            Ok(Ok(())) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    handler = handler.name(),
                    event = event.name(),
                    event_id = %event.metadata().event_id,
                    "event handler failed: {}",
                    e
                );
            }
            Err(_) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    handler = handler.name(),
                    event = event.name(),
                    event_id = %event.metadata().event_id,
                    "event handler panicked"
                );
            }
        }
    }
}

/// In-process publish/subscribe bus
pub struct EventBus {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
    workers: ShardedWorkers<DomainEvent>,
    stats: Arc<BusStats>,
}

impl EventBus {
    /// Start building a bus
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder {
            handlers: Vec::new(),
            shards: DEFAULT_SHARDS,
        }
    }

    /// Wait until every event published so far reached its handlers
    pub async fn flush(&self) {
        self.workers.flush().await;
    }

    /// Stop accepting events and drain the queues
    pub async fn shutdown(&self) {
        self.workers.shutdown().await;
        tracing::info!(
            published = self.published(),
            delivered = self.delivered(),
            failed = self.failed(),
            "event bus stopped"
        );
    }

    /// Registered handler names, in delivery order
    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    /// Events accepted for delivery
    pub fn published(&self) -> u64 {
        self.stats.published.load(Ordering::Relaxed)
    }

    /// Successful handler invocations
    pub fn delivered(&self) -> u64 {
        self.stats.delivered.load(Ordering::Relaxed)
    }

    /// Failed or panicked handler invocations
    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: DomainEvent) {
        let key = event.ordering_key();
        let name = event.name();
        match self.workers.dispatch(&key, event) {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(event = name, "event dropped: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_names())
            .field("shards", &self.workers.shards())
            .finish()
    }
}
