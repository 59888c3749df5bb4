//! Lifecycle engine facade
//!
//! Wires storage, numbering, the event publisher and the clock into the
//! subscription and invoice managers plus the payment registry.

use chrono::{DateTime, NaiveDate, Utc};
use hub_common::Clock;
use hub_events::EventPublisher;
use serde::Serialize;
use std::sync::Arc;

use crate::config::LifecycleConfig;
use crate::error::BillingResult;
use crate::invoicing::{InvoiceManager, OverdueSweepReport};
use crate::lifecycle::{LifecycleSweepReport, SubscriptionManager};
use crate::numbering::InvoiceNumberSequence;
use crate::payments::{InvoicePayments, PaymentConfirmations, SubscriptionPayments};
use crate::plan::PlanCatalog;
use crate::repository::{InvoiceRepository, SubscriptionRepository};

/// Storage the engine runs on
#[derive(Clone)]
pub struct BillingStores {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub invoices: Arc<dyn InvoiceRepository>,
    pub plans: Arc<dyn PlanCatalog>,
    pub sequence: Arc<dyn InvoiceNumberSequence>,
}

/// Result of one scheduled lifecycle run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleRunReport {
    pub as_of: NaiveDate,
    pub subscriptions: LifecycleSweepReport,
    pub invoices: OverdueSweepReport,
}

impl LifecycleRunReport {
    /// Both sweeps finished without a failed record
    pub fn is_success(&self) -> bool {
        self.subscriptions.is_success() && self.invoices.is_success()
    }
}

/// Subscription and invoice lifecycle engine
pub struct BillingEngine {
    subscriptions: Arc<SubscriptionManager>,
    invoices: Arc<InvoiceManager>,
    payments: PaymentConfirmations,
    clock: Arc<dyn Clock>,
}

impl BillingEngine {
    /// Build the engine; rejects an invalid config
    pub fn new(
        stores: BillingStores,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> BillingResult<Self> {
        config.validate()?;

        let subscriptions = Arc::new(SubscriptionManager::new(
            stores.subscriptions,
            stores.plans,
            publisher.clone(),
            clock.clone(),
            config.clone(),
        ));
        let invoices = Arc::new(InvoiceManager::new(
            stores.invoices,
            stores.sequence,
            publisher,
            clock.clone(),
            config,
        ));
        let payments = PaymentConfirmations::new()
            .register(Arc::new(InvoicePayments::new(invoices.clone(), subscriptions.clone())))
            .register(Arc::new(SubscriptionPayments::new(subscriptions.clone())));

        Ok(Self {
            subscriptions,
            invoices,
            payments,
            clock,
        })
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    pub fn invoices(&self) -> &Arc<InvoiceManager> {
        &self.invoices
    }

    pub fn payments(&self) -> &PaymentConfirmations {
        &self.payments
    }

    /// Subscription sweep then overdue sweep, both as of `now`
    pub fn process_lifecycle(&self, now: DateTime<Utc>) -> LifecycleRunReport {
        let as_of = now.date_naive();
        tracing::info!(as_of = %as_of, "processing subscription lifecycle");

        let subscriptions = self.subscriptions.sweep(now);
        let invoices = self.invoices.sweep_overdue(as_of);

        LifecycleRunReport {
            as_of,
            subscriptions,
            invoices,
        }
    }

    /// [`Self::process_lifecycle`] at the engine clock's current time
    pub fn process_lifecycle_now(&self) -> LifecycleRunReport {
        self.process_lifecycle(self.clock.now())
    }
}

impl std::fmt::Debug for BillingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingEngine")
            .field("payments", &self.payments)
            .finish()
    }
}
