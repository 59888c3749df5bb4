//! Subscription lifecycle: explicit transitions and the periodic sweep
//!
//! Every change is computed on a copy, written with a compare-and-swap on
//! the version it was read at, and only then published. A sweep that loses
//! the race against a manual change skips that record for this pass.

use chrono::{DateTime, NaiveDate, Utc};
use hub_common::{
    Clock, DomainEvent, MemberId, PlanId, SubscriptionId, SubscriptionStatus,
    SubscriptionTransition,
};
use hub_events::EventPublisher;
use serde::Serialize;
use std::sync::Arc;

use crate::config::LifecycleConfig;
use crate::error::{BillingError, BillingResult};
use crate::plan::PlanCatalog;
use crate::repository::SubscriptionRepository;
use crate::subscription::Subscription;

/// Outcome of one lifecycle sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleSweepReport {
    /// active → expiring
    pub expiring_marked: u32,
    /// active|expiring → expired
    pub expired_processed: u32,
    /// active|expiring → grace_period
    pub grace_period_started: u32,
    /// grace_period → expired
    pub grace_period_expired: u32,
    /// Skipped after losing to a concurrent change
    pub conflicts: u32,
    pub errors: Vec<String>,
}

impl LifecycleSweepReport {
    /// Transitions applied
    pub fn transitions(&self) -> u32 {
        self.expiring_marked + self.expired_processed + self.grace_period_started + self.grace_period_expired
    }

    /// No subscription failed; conflicts are retried next pass
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Subscription state machine driver
pub struct SubscriptionManager {
    repo: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanCatalog>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl SubscriptionManager {
    pub fn new(
        repo: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanCatalog>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            repo,
            plans,
            publisher,
            clock,
            config,
        }
    }

    pub fn get(&self, id: SubscriptionId) -> BillingResult<Subscription> {
        self.repo.get(id).ok_or_else(|| BillingError::not_found("subscription", id))
    }

    /// Member's subscriptions, oldest first
    pub fn for_member(&self, member_id: MemberId) -> Vec<Subscription> {
        self.repo.for_member(member_id)
    }

    /// New pending subscription on the plan's current terms
    pub fn subscribe(
        &self,
        member_id: MemberId,
        plan_id: &PlanId,
        start_date: Option<NaiveDate>,
        auto_renew: bool,
    ) -> BillingResult<Subscription> {
        let plan = self
            .plans
            .plan(plan_id)
            .ok_or_else(|| BillingError::not_found("plan", plan_id))?;
        let now = self.clock.now();
        let start_date = start_date.unwrap_or_else(|| now.date_naive());

        let subscription = Subscription::new(member_id, &plan.snapshot(), start_date, auto_renew, now)?;
        let stored = self.repo.insert(subscription)?;

        tracing::info!(
            subscription_id = %stored.id,
            member_id = %member_id,
            plan_id = %plan_id,
            start_date = %stored.start_date,
            end_date = %stored.end_date,
            "subscription created"
        );
        Ok(stored)
    }

    /// pending → active
    pub fn activate(&self, id: SubscriptionId) -> BillingResult<Subscription> {
        let now = self.clock.now();
        self.change(id, None, |sub| sub.transition(SubscriptionStatus::Active, now))
            .map(|(sub, transition)| {
                self.publisher.publish(DomainEvent::SubscriptionActivated(transition));
                sub
            })
    }

    /// active-like → cancelled; `reason` is required
    pub fn cancel(&self, id: SubscriptionId, reason: &str) -> BillingResult<Subscription> {
        let now = self.clock.now();
        let reason_text = reason.trim().to_string();
        self.change(id, Some(reason_text), |sub| sub.cancel(reason, now))
            .map(|(sub, transition)| {
                self.publisher.publish(DomainEvent::SubscriptionCancelled(transition));
                sub
            })
    }

    /// any → suspended
    pub fn suspend(&self, id: SubscriptionId, reason: Option<&str>) -> BillingResult<Subscription> {
        let now = self.clock.now();
        let reason = reason.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string);
        self.change(id, reason, |sub| sub.transition(SubscriptionStatus::Suspended, now))
            .map(|(sub, transition)| {
                self.publisher.publish(DomainEvent::SubscriptionSuspended(transition));
                sub
            })
    }

    /// expired|cancelled → active with a fresh period from today
    pub fn renew(&self, id: SubscriptionId) -> BillingResult<Subscription> {
        let current = self.get(id)?;
        let plan = self
            .plans
            .plan(&current.plan_id)
            .ok_or_else(|| BillingError::not_found("plan", &current.plan_id))?;
        let now = self.clock.now();
        let today = now.date_naive();

        self.change(id, None, |sub| sub.renew_period(&plan.snapshot(), today, now))
            .map(|(sub, transition)| {
                self.publisher.publish(DomainEvent::SubscriptionRenewed(transition));
                sub
            })
    }

    /// Apply every due time-driven transition as of `now`
    ///
    /// At most one transition per subscription. Running it again with the
    /// same `now` changes nothing.
    pub fn sweep(&self, now: DateTime<Utc>) -> LifecycleSweepReport {
        let today = now.date_naive();
        let warning_days = self.config.expiry_warning_days;
        let mut report = LifecycleSweepReport::default();

        for candidate in self.repo.time_sensitive() {
            let Some(to) = candidate.evaluate(today, warning_days) else {
                continue;
            };
            let id = candidate.id;
            let from = candidate.status;
            let expected = candidate.version;
            let mut updated = candidate;

            let result = updated
                .transition(to, now)
                .and_then(|_| self.repo.update(updated, expected));

            match result {
                Ok(stored) => {
                    tracing::info!(
                        subscription_id = %stored.id,
                        member_id = %stored.member_id,
                        from = %from,
                        to = %to,
                        end_date = %stored.end_date,
                        "subscription transitioned by sweep"
                    );
                    match (from, to) {
                        (_, SubscriptionStatus::Expiring) => report.expiring_marked += 1,
                        (_, SubscriptionStatus::GracePeriod) => report.grace_period_started += 1,
                        (SubscriptionStatus::GracePeriod, SubscriptionStatus::Expired) => {
                            report.grace_period_expired += 1
                        }
                        _ => report.expired_processed += 1,
                    }
                    if to == SubscriptionStatus::Expired {
                        let transition = stored.transition_payload(from, None, now);
                        self.publisher.publish(DomainEvent::SubscriptionExpired(transition));
                    }
                }
                Err(e) if e.is_conflict() => {
                    tracing::warn!(subscription_id = %id, from = %from, to = %to, "sweep transition skipped: {}", e);
                    report.conflicts += 1;
                }
                Err(e) => {
                    tracing::error!(subscription_id = %id, from = %from, to = %to, "sweep transition failed: {}", e);
                    report.errors.push(e.to_string());
                }
            }
        }

        tracing::info!(
            as_of = %today,
            expiring_marked = report.expiring_marked,
            expired_processed = report.expired_processed,
            grace_period_started = report.grace_period_started,
            grace_period_expired = report.grace_period_expired,
            conflicts = report.conflicts,
            errors = report.errors.len(),
            "subscription lifecycle sweep finished"
        );
        report
    }

    /// Statuses of every subscription the member holds
    pub fn member_statuses(&self, member_id: MemberId) -> Vec<SubscriptionStatus> {
        self.repo.for_member(member_id).into_iter().map(|s| s.status).collect()
    }

    /// Headline status across the member's subscriptions
    pub fn effective_status_for_member(&self, member_id: MemberId) -> Option<SubscriptionStatus> {
        self.member_statuses(member_id)
            .into_iter()
            .max_by_key(SubscriptionStatus::priority)
    }

    /// Read, mutate a copy, compare-and-swap, build the event payload
    fn change<F>(
        &self,
        id: SubscriptionId,
        reason: Option<String>,
        mutate: F,
    ) -> BillingResult<(Subscription, SubscriptionTransition)>
    where
        F: FnOnce(&mut Subscription) -> BillingResult<SubscriptionStatus>,
    {
        let current = self.get(id)?;
        let expected = current.version;
        let mut updated = current;

        let from = mutate(&mut updated)?;
        let stored = self.repo.update(updated, expected)?;

        tracing::info!(
            subscription_id = %stored.id,
            member_id = %stored.member_id,
            from = %from,
            to = %stored.status,
            "subscription transitioned"
        );
        let transition = stored.transition_payload(from, reason, stored.updated_at);
        Ok((stored, transition))
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("config", &self.config)
            .finish()
    }
}
