//! Inbound payment confirmations
//!
//! A gateway reports `PaymentCompleted` against a payable entity reference.
//! Handlers are registered per [`EntityKind`] at startup; an unregistered
//! kind is rejected.

use hub_common::{EntityKind, EntityRef, SubscriptionStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BillingError, BillingResult};
use crate::invoice::{Invoice, InvoiceStatus};
use crate::invoicing::InvoiceManager;
use crate::lifecycle::SubscriptionManager;
use crate::subscription::Subscription;

/// Gateway signal that a payable was settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompleted {
    pub payable: EntityRef,
    pub reference: Option<String>,
    pub gateway: Option<String>,
}

/// What a confirmation changed
#[derive(Debug, Clone, Default, Serialize)]
pub struct PaymentOutcome {
    /// Invoice after the payment, if the payable was one
    pub invoice: Option<Invoice>,
    /// Replayed confirmation; nothing changed
    pub already_paid: bool,
    /// Subscription activated or renewed by the payment
    pub subscription: Option<Subscription>,
    /// Follow-up that failed after the payment itself committed
    pub follow_up_error: Option<String>,
}

/// Confirms payments for one kind of payable
pub trait PayableHandler: Send + Sync {
    fn kind(&self) -> EntityKind;

    fn confirm(&self, payment: &PaymentCompleted) -> BillingResult<PaymentOutcome>;
}

/// Invoices: mark paid, then activate or renew the originating subscription
pub struct InvoicePayments {
    invoices: Arc<InvoiceManager>,
    subscriptions: Arc<SubscriptionManager>,
}

impl InvoicePayments {
    pub fn new(invoices: Arc<InvoiceManager>, subscriptions: Arc<SubscriptionManager>) -> Self {
        Self {
            invoices,
            subscriptions,
        }
    }
}

impl PayableHandler for InvoicePayments {
    fn kind(&self) -> EntityKind {
        EntityKind::Invoice
    }

    fn confirm(&self, payment: &PaymentCompleted) -> BillingResult<PaymentOutcome> {
        let id = payment
            .payable
            .as_invoice()
            .ok_or_else(|| BillingError::Validation(format!("{} is not an invoice", payment.payable)))?;

        let current = self.invoices.get(id)?;
        if current.status == InvoiceStatus::Paid {
            tracing::info!(invoice_id = %id, reference = ?payment.reference, "invoice already paid, confirmation ignored");
            return Ok(PaymentOutcome {
                invoice: Some(current),
                already_paid: true,
                ..PaymentOutcome::default()
            });
        }
        // Paying a draft issues it first so a paid invoice always carries a number
        if current.status == InvoiceStatus::Draft {
            self.invoices.finalize(id)?;
        }

        let paid = self
            .invoices
            .mark_paid(id, payment.reference.clone(), payment.gateway.clone())?;
        let mut outcome = PaymentOutcome {
            invoice: Some(paid.clone()),
            ..PaymentOutcome::default()
        };

        let Some(subscription_id) = paid.origin.and_then(|o| o.as_subscription()) else {
            return Ok(outcome);
        };

        // The payment stays committed whatever happens to the subscription
        let follow_up = self.subscriptions.get(subscription_id).and_then(|sub| match sub.status {
            SubscriptionStatus::Pending => self.subscriptions.activate(subscription_id).map(Some),
            status if status.is_renewable() => self.subscriptions.renew(subscription_id).map(Some),
            _ => Ok(None),
        });
        match follow_up {
            Ok(subscription) => outcome.subscription = subscription,
            Err(e) => {
                tracing::error!(
                    invoice_id = %id,
                    subscription_id = %subscription_id,
                    "invoice paid but subscription follow-up failed: {}",
                    e
                );
                outcome.follow_up_error = Some(e.to_string());
            }
        }
        Ok(outcome)
    }
}

/// Subscriptions paid directly: activate when pending
pub struct SubscriptionPayments {
    subscriptions: Arc<SubscriptionManager>,
}

impl SubscriptionPayments {
    pub fn new(subscriptions: Arc<SubscriptionManager>) -> Self {
        Self { subscriptions }
    }
}

impl PayableHandler for SubscriptionPayments {
    fn kind(&self) -> EntityKind {
        EntityKind::Subscription
    }

    fn confirm(&self, payment: &PaymentCompleted) -> BillingResult<PaymentOutcome> {
        let id = payment.payable.as_subscription().ok_or_else(|| {
            BillingError::Validation(format!("{} is not a subscription", payment.payable))
        })?;

        let current = self.subscriptions.get(id)?;
        let subscription = match current.status {
            SubscriptionStatus::Pending => self.subscriptions.activate(id)?,
            _ => {
                tracing::info!(subscription_id = %id, status = %current.status, "subscription not pending, confirmation ignored");
                current
            }
        };
        Ok(PaymentOutcome {
            subscription: Some(subscription),
            ..PaymentOutcome::default()
        })
    }
}

/// Payable-kind registry
#[derive(Default)]
pub struct PaymentConfirmations {
    handlers: HashMap<EntityKind, Arc<dyn PayableHandler>>,
}

impl PaymentConfirmations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any for the same kind
    pub fn register(mut self, handler: Arc<dyn PayableHandler>) -> Self {
        self.handlers.insert(handler.kind(), handler);
        self
    }

    /// Kinds with a registered handler
    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|k| k.to_string());
        kinds
    }

    pub fn handle(&self, payment: &PaymentCompleted) -> BillingResult<PaymentOutcome> {
        let handler = self.handlers.get(&payment.payable.kind).ok_or_else(|| {
            BillingError::Validation(format!("no payment handler for {}", payment.payable.kind))
        })?;
        tracing::info!(
            payable = %payment.payable,
            reference = ?payment.reference,
            gateway = ?payment.gateway,
            "payment confirmation received"
        );
        handler.confirm(payment)
    }
}

impl std::fmt::Debug for PaymentConfirmations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfirmations").field("kinds", &self.kinds()).finish()
    }
}
