//! Subscription aggregate
//!
//! A subscription carries a frozen copy of its plan terms. Every status
//! change goes through [`Subscription::transition`], which enforces the
//! table on [`SubscriptionStatus`]; time-driven changes are computed by the
//! pure [`Subscription::evaluate`].

use chrono::{DateTime, Days, NaiveDate, Utc};
use hub_common::{
    EventMetadata, MemberId, PlanId, SubscriptionId, SubscriptionStatus, SubscriptionTransition,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};
use crate::plan::{PlanDuration, PlanSnapshot};

/// Member subscription to a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub member_id: MemberId,
    pub plan_id: PlanId,
    pub plan_name: String,
    pub duration: PlanDuration,
    pub status: SubscriptionStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub next_billing_date: Option<NaiveDate>,
    pub grace_period_days: u32,
    pub auto_renew: bool,
    pub price_at_subscription: Decimal,
    pub currency: String,
    /// Tax rate of the plan when the current period started
    #[serde(default)]
    pub tax_rate: Decimal,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    /// Optimistic-lock version, bumped by the repository on every update
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Pending subscription for a fresh period starting on `start_date`
    pub fn new(
        member_id: MemberId,
        plan: &PlanSnapshot,
        start_date: NaiveDate,
        auto_renew: bool,
        now: DateTime<Utc>,
    ) -> BillingResult<Self> {
        let end_date = plan.duration.end_date(start_date)?;
        let mut subscription = Self {
            id: SubscriptionId::new(),
            member_id,
            plan_id: plan.plan_id.clone(),
            plan_name: plan.plan_name.clone(),
            duration: plan.duration,
            status: SubscriptionStatus::Pending,
            start_date,
            end_date,
            next_billing_date: None,
            grace_period_days: plan.grace_period_days,
            auto_renew,
            price_at_subscription: plan.price,
            currency: plan.currency.clone(),
            tax_rate: plan.tax_rate,
            cancelled_at: None,
            cancellation_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        subscription.refresh_next_billing_date();
        Ok(subscription)
    }

    /// Last day of the grace window
    pub fn grace_ends_on(&self) -> NaiveDate {
        self.end_date
            .checked_add_days(Days::new(u64::from(self.grace_period_days)))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Days from `today` until the end date (negative once passed)
    pub fn days_remaining(&self, today: NaiveDate) -> i64 {
        (self.end_date - today).num_days()
    }

    /// The single time-driven transition due on `today`, if any
    pub fn evaluate(&self, today: NaiveDate, warning_days: u32) -> Option<SubscriptionStatus> {
        use SubscriptionStatus::*;

        let past_end = self.end_date < today;
        let grace_elapsed = today > self.grace_ends_on();

        match self.status {
            Active | Expiring if past_end => {
                if self.grace_period_days > 0 && !grace_elapsed {
                    Some(GracePeriod)
                } else {
                    Some(Expired)
                }
            }
            Active => {
                let remaining = self.days_remaining(today);
                (remaining > 0 && remaining <= i64::from(warning_days)).then_some(Expiring)
            }
            GracePeriod if grace_elapsed => Some(Expired),
            _ => None,
        }
    }

    /// Move to `to` if the table allows it; returns the previous status
    pub fn transition(
        &mut self,
        to: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> BillingResult<SubscriptionStatus> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(BillingError::transition("subscription", from, to));
        }
        self.status = to;
        self.updated_at = now;
        Ok(from)
    }

    /// Cancel with a non-empty reason
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> BillingResult<SubscriptionStatus> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BillingError::Validation("cancellation reason is required".into()));
        }
        if !self.status.is_active_like() {
            return Err(BillingError::transition(
                "subscription",
                self.status,
                SubscriptionStatus::Cancelled,
            ));
        }
        let from = self.transition(SubscriptionStatus::Cancelled, now)?;
        self.cancelled_at = Some(now);
        self.cancellation_reason = Some(reason.to_string());
        self.next_billing_date = None;
        Ok(from)
    }

    /// Start a fresh active period on `today` with the current plan terms
    pub fn renew_period(
        &mut self,
        plan: &PlanSnapshot,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> BillingResult<SubscriptionStatus> {
        if !self.status.is_renewable() {
            return Err(BillingError::transition(
                "subscription",
                self.status,
                SubscriptionStatus::Active,
            ));
        }
        let end_date = plan.duration.end_date(today)?;
        let from = self.transition(SubscriptionStatus::Active, now)?;

        self.plan_id = plan.plan_id.clone();
        self.plan_name = plan.plan_name.clone();
        self.duration = plan.duration;
        self.start_date = today;
        self.end_date = end_date;
        self.grace_period_days = plan.grace_period_days;
        self.price_at_subscription = plan.price;
        self.currency = plan.currency.clone();
        self.tax_rate = plan.tax_rate;
        self.cancelled_at = None;
        self.cancellation_reason = None;
        self.refresh_next_billing_date();
        Ok(from)
    }

    /// Event payload for a committed change from `old_status`
    pub fn transition_payload(
        &self,
        old_status: SubscriptionStatus,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> SubscriptionTransition {
        SubscriptionTransition {
            metadata: EventMetadata::new(occurred_at),
            subscription_id: self.id,
            member_id: self.member_id,
            old_status,
            new_status: self.status,
            start_date: self.start_date,
            end_date: self.end_date,
            reason,
        }
    }

    fn refresh_next_billing_date(&mut self) {
        self.next_billing_date = if self.auto_renew {
            self.end_date.checked_add_days(Days::new(1))
        } else {
            None
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use SubscriptionStatus::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot(grace: u32) -> PlanSnapshot {
        PlanSnapshot {
            plan_id: PlanId::new("monthly-desk").unwrap(),
            plan_name: "Monthly desk".to_string(),
            price: dec!(40000),
            currency: "NGN".to_string(),
            duration: PlanDuration::Days(30),
            grace_period_days: grace,
            tax_rate: dec!(7.5),
        }
    }

    fn subscription(status: SubscriptionStatus, end: NaiveDate, grace: u32) -> Subscription {
        let mut sub =
            Subscription::new(MemberId::new(), &snapshot(grace), date(2026, 9, 1), true, Utc::now())
                .unwrap();
        sub.status = status;
        sub.end_date = end;
        sub
    }

    #[test]
    fn test_new_subscription_period() {
        let sub = Subscription::new(
            MemberId::new(),
            &snapshot(5),
            date(2026, 9, 1),
            true,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(sub.status, Pending);
        assert_eq!(sub.end_date, date(2026, 9, 30));
        assert_eq!(sub.next_billing_date, Some(date(2026, 10, 1)));
        assert_eq!(sub.grace_ends_on(), date(2026, 10, 5));
        assert!(sub.end_date >= sub.start_date);
    }

    #[test]
    fn test_warning_window() {
        let today = date(2026, 10, 16);
        let sub = subscription(Active, date(2026, 10, 23), 0);
        assert_eq!(sub.evaluate(today, 7), Some(Expiring));

        let sub = subscription(Active, date(2026, 10, 24), 0);
        assert_eq!(sub.evaluate(today, 7), None);

        // Last day is still active, the day after expires
        let sub = subscription(Active, today, 0);
        assert_eq!(sub.evaluate(today, 7), None);

        let sub = subscription(Expiring, date(2026, 10, 20), 0);
        assert_eq!(sub.evaluate(today, 7), None);
    }

    #[test]
    fn test_past_end_without_grace_expires() {
        let today = date(2026, 10, 16);
        let sub = subscription(Active, date(2026, 10, 15), 0);
        assert_eq!(sub.evaluate(today, 7), Some(Expired));
        let sub = subscription(Expiring, date(2026, 10, 15), 0);
        assert_eq!(sub.evaluate(today, 7), Some(Expired));
    }

    #[test]
    fn test_grace_window() {
        let end = date(2026, 10, 15);
        let sub = subscription(Active, end, 5);
        assert_eq!(sub.evaluate(date(2026, 10, 16), 7), Some(GracePeriod));

        let mut sub = subscription(GracePeriod, end, 5);
        assert_eq!(sub.evaluate(date(2026, 10, 20), 7), None);
        assert_eq!(sub.evaluate(date(2026, 10, 21), 7), Some(Expired));

        // Grace already over when first seen
        sub.status = Expiring;
        assert_eq!(sub.evaluate(date(2026, 10, 25), 7), Some(Expired));
    }

    #[test]
    fn test_non_time_sensitive_statuses_never_move() {
        let today = date(2027, 1, 1);
        for status in [Pending, Expired, Cancelled, Suspended] {
            let sub = subscription(status, date(2026, 1, 1), 3);
            assert_eq!(sub.evaluate(today, 7), None, "{status}");
        }
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut sub = subscription(Pending, date(2026, 9, 30), 0);
        let err = sub.transition(Expired, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            BillingError::InvalidStateTransition {
                entity: "subscription",
                from: "pending".to_string(),
                to: "expired".to_string(),
            }
        );
        assert_eq!(sub.status, Pending);
    }

    #[test]
    fn test_cancel_requires_reason_and_active_like() {
        let mut sub = subscription(Active, date(2026, 9, 30), 0);
        assert!(matches!(
            sub.cancel("   ", Utc::now()),
            Err(BillingError::Validation(_))
        ));
        assert_eq!(sub.status, Active);

        sub.cancel("moving abroad", Utc::now()).unwrap();
        assert_eq!(sub.status, Cancelled);
        assert_eq!(sub.cancellation_reason.as_deref(), Some("moving abroad"));
        assert!(sub.cancelled_at.is_some());

        let mut pending = subscription(Pending, date(2026, 9, 30), 0);
        assert!(matches!(
            pending.cancel("changed mind", Utc::now()),
            Err(BillingError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_renew_uses_current_plan() {
        let mut sub = subscription(Active, date(2026, 9, 30), 0);
        sub.cancel("paused", Utc::now()).unwrap();

        let mut plan = snapshot(2);
        plan.price = dec!(45000);
        plan.duration = PlanDuration::Months(1);
        let today = date(2026, 10, 16);
        let from = sub.renew_period(&plan, today, Utc::now()).unwrap();

        assert_eq!(from, Cancelled);
        assert_eq!(sub.status, Active);
        assert_eq!(sub.start_date, today);
        assert_eq!(sub.end_date, date(2026, 11, 15));
        assert_eq!(sub.price_at_subscription, dec!(45000));
        assert_eq!(sub.grace_period_days, 2);
        assert!(sub.cancelled_at.is_none());
        assert!(sub.cancellation_reason.is_none());
    }

    #[test]
    fn test_renew_rejected_while_active() {
        let mut sub = subscription(Active, date(2026, 9, 30), 0);
        assert!(sub.renew_period(&snapshot(0), date(2026, 10, 1), Utc::now()).is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Transition(SubscriptionStatus),
        Tick(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..SubscriptionStatus::ALL.len()).prop_map(|i| Op::Transition(SubscriptionStatus::ALL[i])),
            (0i64..20).prop_map(Op::Tick),
        ]
    }

    proptest! {
        #[test]
        fn test_every_change_follows_the_table(
            ops in proptest::collection::vec(op(), 1..40),
            grace in 0u32..6,
        ) {
            let mut sub = subscription(Pending, date(2026, 9, 30), grace);
            let mut today = date(2026, 9, 1);

            for op in ops {
                let before = sub.status;
                match op {
                    Op::Transition(to) => {
                        let allowed = before.can_transition_to(to);
                        let result = sub.transition(to, Utc::now());
                        prop_assert_eq!(result.is_ok(), allowed);
                        prop_assert_eq!(sub.status, if allowed { to } else { before });
                    }
                    Op::Tick(days) => {
                        today = today + chrono::Duration::days(days);
                        if let Some(to) = sub.evaluate(today, 7) {
                            prop_assert!(before.can_transition_to(to));
                            sub.transition(to, Utc::now()).unwrap();
                        }
                    }
                }
                prop_assert!(SubscriptionStatus::ALL.contains(&sub.status));
            }
        }
    }
}
