//! Logging subscriber

use async_trait::async_trait;
use hub_common::DomainEvent;

use crate::bus::EventHandler;
use crate::error::HandlerError;

/// Writes every domain event to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let meta = event.metadata();
        if let Some(t) = event.subscription() {
            tracing::info!(
                event = event.name(),
                event_id = %meta.event_id,
                subscription_id = %t.subscription_id,
                member_id = %t.member_id,
                from = %t.old_status,
                to = %t.new_status,
                end_date = %t.end_date,
                reason = t.reason.as_deref().unwrap_or(""),
                "subscription event"
            );
        } else if let Some(s) = event.invoice() {
            tracing::info!(
                event = event.name(),
                event_id = %meta.event_id,
                invoice_id = %s.invoice_id,
                number = s.number.as_deref().unwrap_or(""),
                billable = %s.billable,
                total = %s.total,
                currency = %s.currency,
                gateway = s.gateway.as_deref().unwrap_or(""),
                "invoice event"
            );
        }
        Ok(())
    }
}
