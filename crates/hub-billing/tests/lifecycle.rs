//! Lifecycle engine scenarios end to end

use chrono::{Duration, NaiveDate, Utc};
use hub_billing::{
    BillingEngine, BillingError, BillingStores, DraftInvoice, InMemoryInvoiceRepository,
    InMemoryInvoiceSequence, InMemoryPlanCatalog, InMemorySubscriptionRepository, InvoiceStatus,
    LifecycleConfig, PaymentCompleted, Plan, PlanDuration, Subscription, SubscriptionRepository,
};
use hub_common::{
    Clock, EntityKind, EntityRef, ManualClock, MemberId, PlanId, SubscriptionId,
    SubscriptionStatus,
};
use hub_events::EventRecorder;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;

struct World {
    engine: BillingEngine,
    events: Arc<EventRecorder>,
    clock: Arc<ManualClock>,
    plans: Arc<InMemoryPlanCatalog>,
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

fn plan_id(grace: u32) -> PlanId {
    PlanId::new(format!("desk-grace-{}", grace)).unwrap()
}

fn world_with(subscriptions: Arc<dyn SubscriptionRepository>) -> World {
    let plans = Arc::new(InMemoryPlanCatalog::new());
    for grace in [0, 5] {
        plans
            .upsert(Plan {
                id: plan_id(grace),
                name: format!("Desk, {} day grace", grace),
                price: dec!(40000),
                currency: "NGN".to_string(),
                duration: PlanDuration::Days(30),
                grace_period_days: grace,
                tax_rate: dec!(7.5),
            })
            .unwrap();
    }
    let events = Arc::new(EventRecorder::new());
    let clock = Arc::new(ManualClock::at_date(today()));
    let stores = BillingStores {
        subscriptions,
        invoices: Arc::new(InMemoryInvoiceRepository::new()),
        plans: plans.clone(),
        sequence: Arc::new(InMemoryInvoiceSequence::new()),
    };
    let engine =
        BillingEngine::new(stores, events.clone(), clock.clone(), LifecycleConfig::default()).unwrap();
    World {
        engine,
        events,
        clock,
        plans,
    }
}

fn world() -> World {
    world_with(Arc::new(InMemorySubscriptionRepository::new()))
}

/// Active subscription whose last day was `days_ago` days before today
fn active_ended(w: &World, grace: u32, days_ago: i64) -> Subscription {
    let start = today() - Duration::days(29 + days_ago);
    let subs = w.engine.subscriptions();
    let sub = subs.subscribe(MemberId::new(), &plan_id(grace), Some(start), false).unwrap();
    let sub = subs.activate(sub.id).unwrap();
    w.events.take();
    sub
}

#[test]
fn test_expired_without_grace_emits_once() {
    let w = world();
    let sub = active_ended(&w, 0, 1);
    assert_eq!(sub.end_date, today() - Duration::days(1));

    let report = w.engine.process_lifecycle(w.clock.now());
    assert_eq!(report.subscriptions.expired_processed, 1);
    assert!(report.is_success());
    assert_eq!(
        w.engine.subscriptions().get(sub.id).unwrap().status,
        SubscriptionStatus::Expired
    );

    let again = w.engine.process_lifecycle(w.clock.now());
    assert_eq!(again.subscriptions.transitions(), 0);
    assert_eq!(w.events.count("subscription.expired"), 1);

    let expired = w.events.events();
    let transition = expired[0].subscription().unwrap();
    assert_eq!(transition.subscription_id, sub.id);
    assert_eq!(transition.old_status, SubscriptionStatus::Active);
}

#[test]
fn test_grace_period_then_expiry() {
    let w = world();
    let sub = active_ended(&w, 5, 1);

    let report = w.engine.process_lifecycle(w.clock.now());
    assert_eq!(report.subscriptions.grace_period_started, 1);
    assert_eq!(
        w.engine.subscriptions().get(sub.id).unwrap().status,
        SubscriptionStatus::GracePeriod
    );
    assert_eq!(w.events.count("subscription.expired"), 0);

    // end + 5 is still inside the window
    w.clock.advance(Duration::days(4));
    let report = w.engine.process_lifecycle(w.clock.now());
    assert_eq!(report.subscriptions.transitions(), 0);

    w.clock.advance(Duration::days(1));
    let report = w.engine.process_lifecycle(w.clock.now());
    assert_eq!(report.subscriptions.grace_period_expired, 1);
    assert_eq!(
        w.engine.subscriptions().get(sub.id).unwrap().status,
        SubscriptionStatus::Expired
    );
    assert_eq!(w.events.count("subscription.expired"), 1);
}

#[test]
fn test_sweep_is_idempotent_over_mixed_data() {
    let w = world();
    active_ended(&w, 0, 1);
    active_ended(&w, 5, 1);
    active_ended(&w, 5, 10);
    active_ended(&w, 0, -3);
    active_ended(&w, 0, -20);

    let first = w.engine.process_lifecycle(w.clock.now());
    assert_eq!(first.subscriptions.expired_processed, 2);
    assert_eq!(first.subscriptions.grace_period_started, 1);
    assert_eq!(first.subscriptions.expiring_marked, 1);

    let second = w.engine.process_lifecycle(w.clock.now());
    assert_eq!(second.subscriptions.transitions(), 0);
    assert_eq!(second.invoices.marked, 0);
}

#[test]
fn test_invoice_amounts_with_discount_and_tax() {
    let w = world();
    let invoice = w
        .engine
        .invoices()
        .create_draft(DraftInvoice {
            billable: EntityRef::member(MemberId::new()),
            origin: None,
            subtotal: dec!(100.00),
            discount_amount: dec!(10.00),
            tax_rate: Some(dec!(15)),
            currency: "NGN".to_string(),
            description: None,
        })
        .unwrap();

    assert_eq!(invoice.amounts.tax_amount, dec!(13.50));
    assert_eq!(invoice.amounts.total, dec!(103.50));
}

#[test]
fn test_concurrent_finalization_numbers_are_unique() {
    let w = world();
    let invoices = w.engine.invoices().clone();
    let drafts: Vec<_> = (0..64)
        .map(|_| {
            invoices
                .create_draft(DraftInvoice {
                    billable: EntityRef::member(MemberId::new()),
                    origin: None,
                    subtotal: dec!(10),
                    discount_amount: dec!(0),
                    tax_rate: None,
                    currency: "NGN".to_string(),
                    description: None,
                })
                .unwrap()
                .id
        })
        .collect();

    let handles: Vec<_> = drafts
        .chunks(8)
        .map(|chunk| {
            let invoices = invoices.clone();
            let chunk = chunk.to_vec();
            std::thread::spawn(move || {
                chunk
                    .into_iter()
                    .map(|id| invoices.finalize(id).unwrap().number.unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut numbers = HashSet::new();
    for handle in handles {
        for number in handle.join().unwrap() {
            assert!(number.starts_with("INV-202610-"));
            assert!(numbers.insert(number));
        }
    }
    assert_eq!(numbers.len(), 64);
    assert!(numbers.contains("INV-202610-0064"));
}

/// Lets a manual cancel land between the sweep's read and its write
struct CancelDuringSweep {
    inner: InMemorySubscriptionRepository,
    target: Mutex<Option<SubscriptionId>>,
}

impl SubscriptionRepository for CancelDuringSweep {
    fn insert(&self, subscription: Subscription) -> Result<Subscription, BillingError> {
        self.inner.insert(subscription)
    }

    fn get(&self, id: SubscriptionId) -> Option<Subscription> {
        self.inner.get(id)
    }

    fn for_member(&self, member_id: MemberId) -> Vec<Subscription> {
        self.inner.for_member(member_id)
    }

    fn time_sensitive(&self) -> Vec<Subscription> {
        self.inner.time_sensitive()
    }

    fn all(&self) -> Vec<Subscription> {
        self.inner.all()
    }

    fn update(&self, subscription: Subscription, expected_version: u64) -> Result<Subscription, BillingError> {
        let target = self.target.lock().take();
        if target == Some(subscription.id) {
            let mut current = self.inner.get(subscription.id).unwrap();
            let version = current.version;
            current.cancel("member asked at the front desk", Utc::now()).unwrap();
            self.inner.update(current, version).unwrap();
        }
        self.inner.update(subscription, expected_version)
    }
}

#[test]
fn test_sweep_never_overwrites_manual_cancel() {
    let repo = Arc::new(CancelDuringSweep {
        inner: InMemorySubscriptionRepository::new(),
        target: Mutex::new(None),
    });
    let w = world_with(repo.clone());
    let sub = active_ended(&w, 0, -3);
    *repo.target.lock() = Some(sub.id);

    let report = w.engine.process_lifecycle(w.clock.now());
    assert_eq!(report.subscriptions.conflicts, 1);
    assert_eq!(report.subscriptions.expiring_marked, 0);
    assert!(report.is_success());

    let stored = w.engine.subscriptions().get(sub.id).unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Cancelled);

    let next = w.engine.process_lifecycle(w.clock.now());
    assert_eq!(next.subscriptions.transitions(), 0);
    assert_eq!(next.subscriptions.conflicts, 0);
}

#[test]
fn test_paid_renewal_invoice_activates_pending_subscription() {
    let w = world();
    let subs = w.engine.subscriptions();
    let sub = subs.subscribe(MemberId::new(), &plan_id(0), None, true).unwrap();

    let invoices = w.engine.invoices();
    let invoice = invoices.invoice_for_subscription(&sub).unwrap();
    assert_eq!(invoice.amounts.total, dec!(43000.00));
    invoices.finalize(invoice.id).unwrap();

    let payment = PaymentCompleted {
        payable: EntityRef::invoice(invoice.id),
        reference: Some("PSK-42".to_string()),
        gateway: Some("paystack".to_string()),
    };
    let outcome = w.engine.payments().handle(&payment).unwrap();
    assert!(!outcome.already_paid);
    assert_eq!(outcome.invoice.unwrap().status, InvoiceStatus::Paid);
    assert_eq!(outcome.subscription.unwrap().status, SubscriptionStatus::Active);
    assert_eq!(w.events.count("invoice.paid"), 1);
    assert_eq!(w.events.count("subscription.activated"), 1);

    let paid = w.events.events().into_iter().find(|e| e.name() == "invoice.paid").unwrap();
    let settlement = paid.invoice().unwrap();
    assert_eq!(settlement.origin, Some(EntityRef::subscription(sub.id)));
    assert_eq!(settlement.billable, EntityRef::member(sub.member_id));

    // Replayed webhook
    let replay = w.engine.payments().handle(&payment).unwrap();
    assert!(replay.already_paid);
    assert_eq!(w.events.count("invoice.paid"), 1);
    assert_eq!(w.events.count("subscription.activated"), 1);
}

#[test]
fn test_payment_on_draft_invoice_issues_then_settles() {
    let w = world();
    let sub = w
        .engine
        .subscriptions()
        .subscribe(MemberId::new(), &plan_id(0), None, true)
        .unwrap();
    let draft = w.engine.invoices().invoice_for_subscription(&sub).unwrap();
    assert_eq!(draft.status, InvoiceStatus::Draft);
    assert!(draft.number.is_none());

    let outcome = w
        .engine
        .payments()
        .handle(&PaymentCompleted {
            payable: EntityRef::invoice(draft.id),
            reference: Some("PSK-1".to_string()),
            gateway: Some("paystack".to_string()),
        })
        .unwrap();
    assert!(outcome.follow_up_error.is_none());

    let invoice = w.engine.invoices().get(draft.id).unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Paid);
    assert!(invoice.number.as_deref().unwrap().starts_with("INV-202610-"));
    assert_eq!(invoice.amount_paid, invoice.amounts.total);
    assert_eq!(
        w.engine.subscriptions().get(sub.id).unwrap().status,
        SubscriptionStatus::Active
    );
    assert_eq!(w.events.count("invoice.paid"), 1);
    assert_eq!(w.events.count("subscription.activated"), 1);
}

#[test]
fn test_paid_invoice_renews_expired_subscription_at_current_price() {
    let w = world();
    let sub = active_ended(&w, 0, 1);
    w.engine.process_lifecycle(w.clock.now());

    let mut plan = w.plans.plans().into_iter().find(|p| p.id == plan_id(0)).unwrap();
    plan.price = dec!(50000);
    w.plans.upsert(plan).unwrap();

    let expired = w.engine.subscriptions().get(sub.id).unwrap();
    let invoice = w.engine.invoices().invoice_for_subscription(&expired).unwrap();
    w.engine.invoices().finalize(invoice.id).unwrap();

    let outcome = w
        .engine
        .payments()
        .handle(&PaymentCompleted {
            payable: EntityRef::invoice(invoice.id),
            reference: None,
            gateway: None,
        })
        .unwrap();

    let renewed = outcome.subscription.unwrap();
    assert_eq!(renewed.status, SubscriptionStatus::Active);
    assert_eq!(renewed.start_date, today());
    assert_eq!(renewed.price_at_subscription, dec!(50000));
    assert_eq!(w.events.count("subscription.renewed"), 1);
}

#[test]
fn test_direct_subscription_payment_and_unknown_kind() {
    let w = world();
    let sub = w
        .engine
        .subscriptions()
        .subscribe(MemberId::new(), &plan_id(5), None, false)
        .unwrap();

    let outcome = w
        .engine
        .payments()
        .handle(&PaymentCompleted {
            payable: EntityRef::subscription(sub.id),
            reference: Some("cash".to_string()),
            gateway: None,
        })
        .unwrap();
    assert_eq!(outcome.subscription.unwrap().status, SubscriptionStatus::Active);

    let booking = EntityRef::new(EntityKind::Booking, uuid::Uuid::new_v4());
    let err = w
        .engine
        .payments()
        .handle(&PaymentCompleted {
            payable: booking,
            reference: None,
            gateway: None,
        })
        .unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));
}

#[test]
fn test_overdue_invoices_persisted_by_lifecycle_run() {
    let w = world();
    let invoices = w.engine.invoices();
    let invoice = invoices
        .create_draft(DraftInvoice {
            billable: EntityRef::member(MemberId::new()),
            origin: None,
            subtotal: dec!(20000),
            discount_amount: dec!(0),
            tax_rate: None,
            currency: "NGN".to_string(),
            description: Some("Meeting room".to_string()),
        })
        .unwrap();
    invoices.finalize(invoice.id).unwrap();

    w.clock.advance(Duration::days(15));
    assert_eq!(invoices.effective_status(invoice.id).unwrap(), InvoiceStatus::Overdue);

    let report = w.engine.process_lifecycle_now();
    assert_eq!(report.invoices.marked, 1);
    assert_eq!(invoices.get(invoice.id).unwrap().status, InvoiceStatus::Overdue);
}
