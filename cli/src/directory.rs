//! Member directory backed by the roster and live subscription state

use hub_billing::SubscriptionRepository;
use hub_common::MemberId;
use hub_netsync::{MemberDirectory, MemberProfile, SyncError, SyncResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Stored member, without derived subscription state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: MemberId,
    #[serde(default)]
    pub member_code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub network_password: Option<String>,
}

impl MemberRecord {
    pub fn new(id: MemberId, name: impl Into<String>) -> Self {
        Self {
            id,
            member_code: None,
            name: name.into(),
            email: None,
            phone: None,
            network_password: None,
        }
    }
}

/// Members known to the platform
#[derive(Debug, Default)]
pub struct MemberRoster {
    members: RwLock<HashMap<MemberId, MemberRecord>>,
}

impl MemberRoster {
    /// Replace every member
    pub fn restore(&self, records: Vec<MemberRecord>) {
        *self.members.write() = records.into_iter().map(|m| (m.id, m)).collect();
    }

    pub fn upsert(&self, record: MemberRecord) {
        self.members.write().insert(record.id, record);
    }

    pub fn get(&self, id: MemberId) -> Option<MemberRecord> {
        self.members.read().get(&id).cloned()
    }

    /// All members by name
    pub fn records(&self) -> Vec<MemberRecord> {
        let mut records: Vec<MemberRecord> = self.members.read().values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        records
    }
}

/// [`MemberDirectory`] joining the roster with subscription statuses
pub struct BillingMemberDirectory {
    roster: Arc<MemberRoster>,
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl BillingMemberDirectory {
    pub fn new(roster: Arc<MemberRoster>, subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self {
            roster,
            subscriptions,
        }
    }

    fn profile(&self, record: MemberRecord) -> MemberProfile {
        let statuses = self
            .subscriptions
            .for_member(record.id)
            .into_iter()
            .map(|s| s.status)
            .collect();
        MemberProfile {
            id: record.id,
            member_code: record.member_code,
            name: record.name,
            email: record.email,
            phone: record.phone,
            network_password: record.network_password,
            statuses,
        }
    }
}

impl MemberDirectory for BillingMemberDirectory {
    fn members(&self) -> SyncResult<Vec<MemberProfile>> {
        Ok(self.roster.records().into_iter().map(|r| self.profile(r)).collect())
    }

    fn member(&self, id: MemberId) -> SyncResult<Option<MemberProfile>> {
        Ok(self.roster.get(id).map(|r| self.profile(r)))
    }

    fn store_network_password(&self, id: MemberId, password: &str) -> SyncResult<()> {
        let mut members = self.roster.members.write();
        let record = members.get_mut(&id).ok_or(SyncError::MemberNotFound(id))?;
        record.network_password = Some(password.to_string());
        Ok(())
    }
}
