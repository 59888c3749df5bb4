//! Event recorder
//!
//! Keeps every event it sees. Works both as a publisher (engine tests,
//! dry runs) and as a bus subscriber (run summaries).

use async_trait::async_trait;
use hub_common::DomainEvent;
use parking_lot::Mutex;

use crate::bus::{EventHandler, EventPublisher};
use crate::error::HandlerError;

/// Collects events in arrival order
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<DomainEvent>>,
}

impl EventRecorder {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events with the given dotted name
    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    /// Drain recorded events
    pub fn take(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn record(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}

impl EventPublisher for EventRecorder {
    fn publish(&self, event: DomainEvent) {
        self.record(event);
    }
}

#[async_trait]
impl EventHandler for EventRecorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        self.record(event.clone());
        Ok(())
    }
}
