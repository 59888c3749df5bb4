//! Invoice lifecycle: drafting, finalization, payment, voiding, overdue sweep

use chrono::{DateTime, Days, NaiveDate, Utc};
use hub_common::{Clock, DomainEvent, EntityRef, InvoiceId};
use hub_events::EventPublisher;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::config::LifecycleConfig;
use crate::error::{BillingError, BillingResult};
use crate::invoice::{Invoice, InvoiceStatus};
use crate::money::InvoiceAmounts;
use crate::numbering::{format_number, period_of, InvoiceNumberSequence};
use crate::repository::InvoiceRepository;
use crate::subscription::Subscription;

/// Input for a new draft invoice
#[derive(Debug, Clone)]
pub struct DraftInvoice {
    pub billable: EntityRef,
    pub origin: Option<EntityRef>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    /// Falls back to the configured default
    pub tax_rate: Option<Decimal>,
    pub currency: String,
    pub description: Option<String>,
}

/// Outcome of one overdue sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverdueSweepReport {
    /// sent → overdue persisted
    pub marked: u32,
    pub conflicts: u32,
    pub errors: Vec<String>,
}

impl OverdueSweepReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Invoice state machine driver
pub struct InvoiceManager {
    repo: Arc<dyn InvoiceRepository>,
    sequence: Arc<dyn InvoiceNumberSequence>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl InvoiceManager {
    pub fn new(
        repo: Arc<dyn InvoiceRepository>,
        sequence: Arc<dyn InvoiceNumberSequence>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            repo,
            sequence,
            publisher,
            clock,
            config,
        }
    }

    pub fn get(&self, id: InvoiceId) -> BillingResult<Invoice> {
        self.repo.get(id).ok_or_else(|| BillingError::not_found("invoice", id))
    }

    /// Invoices billed to an entity
    pub fn for_billable(&self, billable: EntityRef) -> Vec<Invoice> {
        self.repo.for_billable(billable)
    }

    /// Unnumbered draft with computed amounts
    pub fn create_draft(&self, draft: DraftInvoice) -> BillingResult<Invoice> {
        let tax_rate = draft.tax_rate.unwrap_or(self.config.default_tax_rate);
        let amounts = InvoiceAmounts::compute(draft.subtotal, draft.discount_amount, tax_rate)?;
        let mut invoice = Invoice::draft(draft.billable, draft.origin, amounts, draft.currency, self.clock.now());
        invoice.description = draft.description;

        let stored = self.repo.insert(invoice)?;
        tracing::info!(
            invoice_id = %stored.id,
            billable = %stored.billable,
            total = %stored.amounts.total,
            "draft invoice created"
        );
        Ok(stored)
    }

    /// Draft renewal invoice for a subscription's current terms
    pub fn invoice_for_subscription(&self, subscription: &Subscription) -> BillingResult<Invoice> {
        self.create_draft(DraftInvoice {
            billable: EntityRef::member(subscription.member_id),
            origin: Some(EntityRef::subscription(subscription.id)),
            subtotal: subscription.price_at_subscription,
            discount_amount: Decimal::ZERO,
            tax_rate: Some(subscription.tax_rate),
            currency: subscription.currency.clone(),
            description: Some(format!(
                "{} ({} to {})",
                subscription.plan_name, subscription.start_date, subscription.end_date
            )),
        })
    }

    /// Recompute a draft's amounts
    pub fn update_amounts(
        &self,
        id: InvoiceId,
        subtotal: Decimal,
        discount_amount: Decimal,
        tax_rate: Decimal,
    ) -> BillingResult<Invoice> {
        let now = self.clock.now();
        let (invoice, expected) = self.load(id)?;
        let mut updated = invoice;
        updated.update_amounts(subtotal, discount_amount, tax_rate, now)?;
        self.repo.update(updated, expected)
    }

    /// draft → sent, numbered, issued today
    ///
    /// A lost compare-and-swap leaves a gap in the period's sequence.
    pub fn finalize(&self, id: InvoiceId) -> BillingResult<Invoice> {
        let now = self.clock.now();
        let today = now.date_naive();
        let (invoice, expected) = self.load(id)?;
        if !invoice.status.can_transition_to(InvoiceStatus::Sent) {
            return Err(BillingError::transition("invoice", invoice.status, InvoiceStatus::Sent));
        }

        let period = period_of(today);
        let number = format_number(&self.config.invoice_number_prefix, &period, self.sequence.next(&period));
        let due_date = today
            .checked_add_days(Days::new(u64::from(self.config.invoice_due_days)))
            .unwrap_or(NaiveDate::MAX);

        let mut updated = invoice;
        updated.finalize(number, today, due_date, now)?;
        let stored = self.repo.update(updated, expected)?;

        tracing::info!(
            invoice_id = %stored.id,
            number = stored.number.as_deref().unwrap_or_default(),
            due_date = %due_date,
            "invoice finalized"
        );
        Ok(stored)
    }

    /// Settle in full; reference and gateway are optional for offline payments
    pub fn mark_paid(
        &self,
        id: InvoiceId,
        reference: Option<String>,
        gateway: Option<String>,
    ) -> BillingResult<Invoice> {
        let now = self.clock.now();
        let (invoice, expected) = self.load(id)?;
        if !invoice.status.can_be_paid() {
            return Err(BillingError::transition("invoice", invoice.status, InvoiceStatus::Paid));
        }

        let mut updated = invoice;
        updated.transition(InvoiceStatus::Paid, now)?;
        updated.amount_paid = updated.amounts.total;
        updated.paid_at = Some(now);
        updated.transaction_reference = reference;
        updated.gateway = gateway;
        let stored = self.repo.update(updated, expected)?;

        self.paid(&stored, now);
        Ok(stored)
    }

    /// Apply a payment of `amount`; partially paid until the balance is zero
    pub fn record_payment(
        &self,
        id: InvoiceId,
        amount: Decimal,
        reference: Option<String>,
        gateway: Option<String>,
    ) -> BillingResult<Invoice> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::Validation("payment amount must be positive".into()));
        }
        let now = self.clock.now();
        let (invoice, expected) = self.load(id)?;
        if !invoice.status.can_be_paid() {
            return Err(BillingError::transition(
                "invoice",
                invoice.status,
                InvoiceStatus::PartiallyPaid,
            ));
        }
        if amount > invoice.balance_due() {
            return Err(BillingError::Validation(format!(
                "payment of {} exceeds balance due {}",
                amount,
                invoice.balance_due()
            )));
        }

        let mut updated = invoice;
        updated.amount_paid += amount;
        let settled = updated.amount_paid >= updated.amounts.total;
        let target = if settled {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::PartiallyPaid
        };
        if updated.status != target {
            updated.transition(target, now)?;
        }
        updated.updated_at = now;
        if reference.is_some() {
            updated.transaction_reference = reference;
        }
        if gateway.is_some() {
            updated.gateway = gateway;
        }
        if settled {
            updated.paid_at = Some(now);
        }
        let stored = self.repo.update(updated, expected)?;

        tracing::info!(
            invoice_id = %stored.id,
            amount = %amount,
            balance_due = %stored.balance_due(),
            status = %stored.status,
            "payment recorded"
        );
        if settled {
            self.paid(&stored, now);
        }
        Ok(stored)
    }

    /// draft|sent|overdue → void
    pub fn void(&self, id: InvoiceId, reason: Option<String>) -> BillingResult<Invoice> {
        let now = self.clock.now();
        let (invoice, expected) = self.load(id)?;
        if !invoice.status.can_be_voided() {
            return Err(BillingError::transition("invoice", invoice.status, InvoiceStatus::Void));
        }

        let mut updated = invoice;
        updated.transition(InvoiceStatus::Void, now)?;
        updated.voided_at = Some(now);
        updated.void_reason = reason.clone();
        let stored = self.repo.update(updated, expected)?;

        tracing::info!(invoice_id = %stored.id, number = ?stored.number, "invoice voided");
        self.publisher
            .publish(DomainEvent::InvoiceVoided(stored.settlement(reason, now)));
        Ok(stored)
    }

    /// Status for business decisions today, overdue computed lazily
    pub fn effective_status(&self, id: InvoiceId) -> BillingResult<InvoiceStatus> {
        Ok(self.get(id)?.effective_status(self.clock.today()))
    }

    /// Persist overdue for every sent invoice past its due date
    pub fn sweep_overdue(&self, today: NaiveDate) -> OverdueSweepReport {
        let now = self.clock.now();
        let mut report = OverdueSweepReport::default();

        for invoice in self.repo.sent_past_due(today) {
            let id = invoice.id;
            let expected = invoice.version;
            let mut updated = invoice;

            let result = updated
                .transition(InvoiceStatus::Overdue, now)
                .and_then(|_| self.repo.update(updated, expected));
            match result {
                Ok(_) => report.marked += 1,
                Err(e) if e.is_conflict() => {
                    tracing::warn!(invoice_id = %id, "overdue mark skipped: {}", e);
                    report.conflicts += 1;
                }
                Err(e) => {
                    tracing::error!(invoice_id = %id, "overdue mark failed: {}", e);
                    report.errors.push(e.to_string());
                }
            }
        }

        tracing::info!(
            as_of = %today,
            marked = report.marked,
            conflicts = report.conflicts,
            "overdue invoice sweep finished"
        );
        report
    }

    fn load(&self, id: InvoiceId) -> BillingResult<(Invoice, u64)> {
        let invoice = self.get(id)?;
        let version = invoice.version;
        Ok((invoice, version))
    }

    fn paid(&self, invoice: &Invoice, now: DateTime<Utc>) {
        tracing::info!(
            invoice_id = %invoice.id,
            number = ?invoice.number,
            billable = %invoice.billable,
            origin = ?invoice.origin,
            gateway = ?invoice.gateway,
            "invoice paid"
        );
        self.publisher
            .publish(DomainEvent::InvoicePaid(invoice.settlement(None, now)));
    }
}

impl std::fmt::Debug for InvoiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceManager").field("config", &self.config).finish()
    }
}
