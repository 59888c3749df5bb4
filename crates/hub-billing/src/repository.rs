//! Subscription and invoice storage with optimistic concurrency
//!
//! Every update names the version it was computed from. If the stored record
//! moved on in the meantime the update is refused with
//! [`BillingError::ConcurrentModification`] and nothing is written. A
//! successful update stores the record at `expected_version + 1`.

use chrono::NaiveDate;
use hub_common::{EntityRef, InvoiceId, MemberId, SubscriptionId};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{BillingError, BillingResult};
use crate::invoice::{Invoice, InvoiceStatus};
use crate::subscription::Subscription;

/// Subscription storage
pub trait SubscriptionRepository: Send + Sync {
    /// Store a new subscription
    fn insert(&self, subscription: Subscription) -> BillingResult<Subscription>;

    fn get(&self, id: SubscriptionId) -> Option<Subscription>;

    /// Every subscription of a member
    fn for_member(&self, member_id: MemberId) -> Vec<Subscription>;

    /// Subscriptions the lifecycle sweep re-evaluates
    fn time_sensitive(&self) -> Vec<Subscription>;

    fn all(&self) -> Vec<Subscription>;

    /// Compare-and-swap on `version`; returns the stored record
    fn update(&self, subscription: Subscription, expected_version: u64) -> BillingResult<Subscription>;
}

/// Invoice storage
pub trait InvoiceRepository: Send + Sync {
    /// Store a new invoice
    fn insert(&self, invoice: Invoice) -> BillingResult<Invoice>;

    fn get(&self, id: InvoiceId) -> Option<Invoice>;

    /// Invoices billed to an entity
    fn for_billable(&self, billable: EntityRef) -> Vec<Invoice>;

    /// Invoices generated by an entity
    fn for_origin(&self, origin: EntityRef) -> Vec<Invoice>;

    /// Sent invoices whose due date is before `today`
    fn sent_past_due(&self, today: NaiveDate) -> Vec<Invoice>;

    fn all(&self) -> Vec<Invoice>;

    /// Compare-and-swap on `version`; returns the stored record
    fn update(&self, invoice: Invoice, expected_version: u64) -> BillingResult<Invoice>;
}

/// In-memory subscription store
#[derive(Debug, Default)]
pub struct InMemorySubscriptionRepository {
    records: RwLock<HashMap<SubscriptionId, Subscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, ordered by creation time
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.all()
    }

    /// Replace every record
    pub fn restore(&self, subscriptions: Vec<Subscription>) {
        let records = subscriptions.into_iter().map(|s| (s.id, s)).collect();
        *self.records.write() = records;
    }

    fn collect(&self, filter: impl Fn(&Subscription) -> bool) -> Vec<Subscription> {
        let mut found: Vec<Subscription> =
            self.records.read().values().filter(|s| filter(s)).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        found
    }
}

impl SubscriptionRepository for InMemorySubscriptionRepository {
    fn insert(&self, mut subscription: Subscription) -> BillingResult<Subscription> {
        let mut records = self.records.write();
        if records.contains_key(&subscription.id) {
            return Err(BillingError::Validation(format!(
                "subscription {} already exists",
                subscription.id
            )));
        }
        subscription.version = 1;
        records.insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    fn get(&self, id: SubscriptionId) -> Option<Subscription> {
        self.records.read().get(&id).cloned()
    }

    fn for_member(&self, member_id: MemberId) -> Vec<Subscription> {
        self.collect(|s| s.member_id == member_id)
    }

    fn time_sensitive(&self) -> Vec<Subscription> {
        self.collect(|s| s.status.is_time_sensitive())
    }

    fn all(&self) -> Vec<Subscription> {
        self.collect(|_| true)
    }

    fn update(&self, mut subscription: Subscription, expected_version: u64) -> BillingResult<Subscription> {
        let mut records = self.records.write();
        let stored = records
            .get_mut(&subscription.id)
            .ok_or_else(|| BillingError::not_found("subscription", subscription.id))?;

        if stored.version != expected_version {
            return Err(BillingError::ConcurrentModification {
                entity: "subscription",
                id: subscription.id.as_uuid(),
                expected: expected_version,
                actual: stored.version,
            });
        }

        subscription.version = expected_version + 1;
        *stored = subscription.clone();
        Ok(subscription)
    }
}

/// In-memory invoice store
#[derive(Debug, Default)]
pub struct InMemoryInvoiceRepository {
    records: RwLock<HashMap<InvoiceId, Invoice>>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, ordered by creation time
    pub fn snapshot(&self) -> Vec<Invoice> {
        self.all()
    }

    /// Replace every record
    pub fn restore(&self, invoices: Vec<Invoice>) {
        let records = invoices.into_iter().map(|i| (i.id, i)).collect();
        *self.records.write() = records;
    }

    fn collect(&self, filter: impl Fn(&Invoice) -> bool) -> Vec<Invoice> {
        let mut found: Vec<Invoice> =
            self.records.read().values().filter(|i| filter(i)).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        found
    }
}

impl InvoiceRepository for InMemoryInvoiceRepository {
    fn insert(&self, mut invoice: Invoice) -> BillingResult<Invoice> {
        let mut records = self.records.write();
        if records.contains_key(&invoice.id) {
            return Err(BillingError::Validation(format!("invoice {} already exists", invoice.id)));
        }
        invoice.version = 1;
        records.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    fn get(&self, id: InvoiceId) -> Option<Invoice> {
        self.records.read().get(&id).cloned()
    }

    fn for_billable(&self, billable: EntityRef) -> Vec<Invoice> {
        self.collect(|i| i.billable == billable)
    }

    fn for_origin(&self, origin: EntityRef) -> Vec<Invoice> {
        self.collect(|i| i.origin == Some(origin))
    }

    fn sent_past_due(&self, today: NaiveDate) -> Vec<Invoice> {
        self.collect(|i| i.status == InvoiceStatus::Sent && i.is_past_due(today))
    }

    fn all(&self) -> Vec<Invoice> {
        self.collect(|_| true)
    }

    fn update(&self, mut invoice: Invoice, expected_version: u64) -> BillingResult<Invoice> {
        let mut records = self.records.write();
        let stored = records
            .get_mut(&invoice.id)
            .ok_or_else(|| BillingError::not_found("invoice", invoice.id))?;

        if stored.version != expected_version {
            return Err(BillingError::ConcurrentModification {
                entity: "invoice",
                id: invoice.id.as_uuid(),
                expected: expected_version,
                actual: stored.version,
            });
        }
        // Numbers never change once assigned
        if stored.number.is_some() && stored.number != invoice.number {
            return Err(BillingError::Validation(format!(
                "invoice {} number is immutable",
                invoice.id
            )));
        }

        invoice.version = expected_version + 1;
        *stored = invoice.clone();
        Ok(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::InvoiceAmounts;
    use crate::plan::{PlanDuration, PlanSnapshot};
    use chrono::Utc;
    use hub_common::{PlanId, SubscriptionStatus};
    use rust_decimal_macros::dec;

    fn subscription(member_id: MemberId) -> Subscription {
        let plan = PlanSnapshot {
            plan_id: PlanId::new("day-pass").unwrap(),
            plan_name: "Day pass".to_string(),
            price: dec!(5000),
            currency: "NGN".to_string(),
            duration: PlanDuration::Days(1),
            grace_period_days: 0,
            tax_rate: dec!(0),
        };
        Subscription::new(
            member_id,
            &plan,
            NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            false,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_update_bumps_version() {
        let repo = InMemorySubscriptionRepository::new();
        let stored = repo.insert(subscription(MemberId::new())).unwrap();
        assert_eq!(stored.version, 1);

        let mut changed = stored.clone();
        changed.status = SubscriptionStatus::Active;
        let updated = repo.update(changed, stored.version).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(repo.get(stored.id).unwrap().status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_stale_update_rejected() {
        let repo = InMemorySubscriptionRepository::new();
        let stored = repo.insert(subscription(MemberId::new())).unwrap();

        let mut first = stored.clone();
        first.status = SubscriptionStatus::Active;
        repo.update(first, stored.version).unwrap();

        let mut stale = stored.clone();
        stale.status = SubscriptionStatus::Suspended;
        let err = repo.update(stale, stored.version).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(repo.get(stored.id).unwrap().status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_queries() {
        let repo = InMemorySubscriptionRepository::new();
        let member = MemberId::new();
        let pending = repo.insert(subscription(member)).unwrap();
        let mut active = repo.insert(subscription(member)).unwrap();
        active.status = SubscriptionStatus::Active;
        let version = active.version;
        repo.update(active, version).unwrap();
        repo.insert(subscription(MemberId::new())).unwrap();

        assert_eq!(repo.for_member(member).len(), 2);
        assert_eq!(repo.time_sensitive().len(), 1);
        assert!(repo.time_sensitive().iter().all(|s| s.id != pending.id));
        assert_eq!(repo.all().len(), 3);

        let restored = InMemorySubscriptionRepository::new();
        restored.restore(repo.snapshot());
        assert_eq!(restored.all(), repo.all());
    }

    #[test]
    fn test_invoice_number_is_immutable() {
        let repo = InMemoryInvoiceRepository::new();
        let amounts = InvoiceAmounts::compute(dec!(10), dec!(0), dec!(0)).unwrap();
        let member = EntityRef::member(MemberId::new());
        let mut invoice = repo
            .insert(Invoice::draft(member, None, amounts, "NGN", Utc::now()))
            .unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        invoice
            .finalize("INV-202610-0001".into(), today, today, Utc::now())
            .unwrap();
        let version = invoice.version;
        let mut stored = repo.update(invoice, version).unwrap();

        stored.number = Some("INV-202610-0099".into());
        let version = stored.version;
        assert!(matches!(repo.update(stored, version), Err(BillingError::Validation(_))));
        assert_eq!(repo.for_billable(member).len(), 1);
        assert_eq!(repo.sent_past_due(today.succ_opt().unwrap()).len(), 1);
        assert!(repo.sent_past_due(today).is_empty());
    }
}
