//! Persisted platform state
//!
//! Members, plans, subscriptions, invoices and invoice sequences live in one
//! JSON document under `data_dir`. It is rewritten atomically (temp file,
//! then rename) after every command that changes it.

use anyhow::Context;
use hub_billing::{
    BillingStores, InMemoryInvoiceRepository, InMemoryInvoiceSequence, InMemoryPlanCatalog,
    InMemorySubscriptionRepository, Invoice, Plan, Subscription,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::directory::{MemberRecord, MemberRoster};

/// On-disk document
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct State {
    pub members: Vec<MemberRecord>,
    pub plans: Vec<Plan>,
    pub subscriptions: Vec<Subscription>,
    pub invoices: Vec<Invoice>,
    pub invoice_sequences: BTreeMap<String, u64>,
}

/// Loaded state, shared by the engine and the sync directory
pub struct Hub {
    path: PathBuf,
    save_lock: Mutex<()>,
    pub roster: Arc<MemberRoster>,
    pub plans: Arc<InMemoryPlanCatalog>,
    pub subscriptions: Arc<InMemorySubscriptionRepository>,
    pub invoices: Arc<InMemoryInvoiceRepository>,
    pub sequence: Arc<InMemoryInvoiceSequence>,
}

impl Hub {
    /// Load `path`, or start empty if it doesn't exist yet
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let hub = Self {
            save_lock: Mutex::new(()),
            roster: Arc::new(MemberRoster::default()),
            plans: Arc::new(InMemoryPlanCatalog::new()),
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            invoices: Arc::new(InMemoryInvoiceRepository::new()),
            sequence: Arc::new(InMemoryInvoiceSequence::new()),
            path,
        };
        hub.apply(hub.read()?)?;
        Ok(hub)
    }

    /// Replace in-memory state with what is on disk
    ///
    /// Picks up writes from other processes. Anything not yet saved is lost.
    pub fn reload(&self) -> anyhow::Result<()> {
        let _guard = self.save_lock.lock();
        self.apply(self.read()?)?;
        tracing::debug!(path = %self.path.display(), "state reloaded");
        Ok(())
    }

    fn read(&self) -> anyhow::Result<State> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "no state yet, starting empty");
            return Ok(State::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("cannot read state {}", self.path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("corrupt state {}", self.path.display()))
    }

    fn apply(&self, state: State) -> anyhow::Result<()> {
        self.plans.restore(state.plans)?;
        self.roster.restore(state.members);
        self.subscriptions.restore(state.subscriptions);
        self.invoices.restore(state.invoices);
        self.sequence.restore(state.invoice_sequences);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Storage handles for the billing engine
    pub fn stores(&self) -> BillingStores {
        BillingStores {
            subscriptions: self.subscriptions.clone(),
            invoices: self.invoices.clone(),
            plans: self.plans.clone(),
            sequence: self.sequence.clone(),
        }
    }

    pub fn snapshot(&self) -> State {
        State {
            members: self.roster.records(),
            plans: self.plans.plans(),
            subscriptions: self.subscriptions.snapshot(),
            invoices: self.invoices.snapshot(),
            invoice_sequences: self.sequence.snapshot(),
        }
    }

    /// Write the current state atomically
    pub fn save(&self) -> anyhow::Result<()> {
        let _guard = self.save_lock.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.snapshot())?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).with_context(|| format!("cannot write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("cannot replace {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hub_billing::{PlanDuration, SubscriptionRepository};
    use hub_common::{MemberId, PlanId};
    use rust_decimal_macros::dec;

    #[test]
    fn test_state_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let hub = Hub::load(&path).unwrap();
        let member = MemberRecord::new(MemberId::new(), "Ada Obi");
        let member_id = member.id;
        hub.roster.upsert(member);
        hub.plans
            .upsert(Plan {
                id: PlanId::new("monthly-desk").unwrap(),
                name: "Monthly desk".to_string(),
                price: dec!(40000),
                currency: "NGN".to_string(),
                duration: PlanDuration::Months(1),
                grace_period_days: 3,
                tax_rate: dec!(7.5),
            })
            .unwrap();
        let plan = hub.plans.plans().remove(0);
        let sub = Subscription::new(
            member_id,
            &plan.snapshot(),
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            true,
            chrono::Utc::now(),
        )
        .unwrap();
        hub.subscriptions.insert(sub).unwrap();
        hub.save().unwrap();

        let reloaded = Hub::load(&path).unwrap();
        assert_eq!(reloaded.roster.records().len(), 1);
        assert_eq!(reloaded.plans.plans(), hub.plans.plans());
        assert_eq!(reloaded.subscriptions.for_member(member_id).len(), 1);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_reload_picks_up_other_writers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let worker = Hub::load(&path).unwrap();
        worker.roster.upsert(MemberRecord::new(MemberId::new(), "Stale"));

        let other = Hub::load(&path).unwrap();
        let member = MemberRecord::new(MemberId::new(), "Chidi Okafor");
        let member_id = member.id;
        other.roster.upsert(member);
        other.save().unwrap();

        worker.reload().unwrap();
        let records = worker.roster.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, member_id);
    }
}
