//! Membership plans and the snapshot a subscription keeps of them

use chrono::{Days, Months, NaiveDate};
use hub_common::PlanId;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{BillingError, BillingResult};

/// Length of one billing period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "count", rename_all = "snake_case")]
pub enum PlanDuration {
    Days(u32),
    Months(u32),
}

impl PlanDuration {
    /// Last day of a period starting on `start` (inclusive)
    ///
    /// A one-month period starting Jan 15 ends Feb 14. Month arithmetic
    /// clamps to the end of shorter months before the final day is removed.
    pub fn end_date(&self, start: NaiveDate) -> BillingResult<NaiveDate> {
        let next_start = match *self {
            Self::Days(0) | Self::Months(0) => {
                return Err(BillingError::Validation("plan duration must be positive".into()))
            }
            Self::Days(n) => start.checked_add_days(Days::new(u64::from(n))),
            Self::Months(n) => start.checked_add_months(Months::new(n)),
        };
        next_start
            .and_then(|d| d.checked_sub_days(Days::new(1)))
            .ok_or_else(|| BillingError::Validation(format!("period from {} out of range", start)))
    }
}

impl std::fmt::Display for PlanDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Days(n) => write!(f, "{} day(s)", n),
            Self::Months(n) => write!(f, "{} month(s)", n),
        }
    }
}

/// Membership plan as currently offered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub duration: PlanDuration,
    #[serde(default)]
    pub grace_period_days: u32,
    /// Percent applied to renewal invoices
    #[serde(default)]
    pub tax_rate: Decimal,
}

impl Plan {
    /// Check price, currency and duration
    pub fn validate(&self) -> BillingResult<()> {
        if self.name.trim().is_empty() {
            return Err(BillingError::Validation(format!("plan {} has no name", self.id)));
        }
        if self.price.is_sign_negative() && !self.price.is_zero() {
            return Err(BillingError::Validation(format!("plan {} has a negative price", self.id)));
        }
        if self.tax_rate.is_sign_negative() && !self.tax_rate.is_zero() {
            return Err(BillingError::Validation(format!("plan {} has a negative tax rate", self.id)));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(BillingError::Validation(format!(
                "plan {} currency must be a 3-letter ISO code, got {:?}",
                self.id, self.currency
            )));
        }
        if matches!(self.duration, PlanDuration::Days(0) | PlanDuration::Months(0)) {
            return Err(BillingError::Validation(format!("plan {} has a zero duration", self.id)));
        }
        Ok(())
    }

    /// Terms frozen onto a subscription
    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            plan_id: self.id.clone(),
            plan_name: self.name.clone(),
            price: self.price,
            currency: self.currency.clone(),
            duration: self.duration,
            grace_period_days: self.grace_period_days,
            tax_rate: self.tax_rate,
        }
    }
}

/// Plan terms captured when a subscription starts or renews
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub plan_id: PlanId,
    pub plan_name: String,
    pub price: Decimal,
    pub currency: String,
    pub duration: PlanDuration,
    pub grace_period_days: u32,
    pub tax_rate: Decimal,
}

/// Read access to plans
pub trait PlanCatalog: Send + Sync {
    /// Plan by id
    fn plan(&self, id: &PlanId) -> Option<Plan>;
}

/// In-memory plan catalog
#[derive(Debug, Default)]
pub struct InMemoryPlanCatalog {
    plans: RwLock<HashMap<PlanId, Plan>>,
}

impl InMemoryPlanCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a plan
    pub fn upsert(&self, plan: Plan) -> BillingResult<()> {
        plan.validate()?;
        tracing::debug!(plan_id = %plan.id, price = %plan.price, "plan stored");
        self.plans.write().insert(plan.id.clone(), plan);
        Ok(())
    }

    /// Replace every plan
    pub fn restore(&self, plans: Vec<Plan>) -> BillingResult<()> {
        for plan in &plans {
            plan.validate()?;
        }
        *self.plans.write() = plans.into_iter().map(|p| (p.id.clone(), p)).collect();
        Ok(())
    }

    /// All plans, by id
    pub fn plans(&self) -> Vec<Plan> {
        let mut plans: Vec<Plan> = self.plans.read().values().cloned().collect();
        plans.sort_by(|a, b| a.id.cmp(&b.id));
        plans
    }
}

impl PlanCatalog for InMemoryPlanCatalog {
    fn plan(&self, id: &PlanId) -> Option<Plan> {
        self.plans.read().get(id).cloned()
    }
}
