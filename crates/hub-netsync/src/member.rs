//! Member directory as seen by network sync

use hub_common::{desired_access, DesiredAccess, MemberId, SubscriptionStatus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{SyncError, SyncResult};

/// Member fields needed to provision a hotspot account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: MemberId,
    pub member_code: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Hotspot password, assigned on first enable when missing
    pub network_password: Option<String>,
    /// Statuses of all the member's subscriptions
    #[serde(default)]
    pub statuses: Vec<SubscriptionStatus>,
}

impl MemberProfile {
    /// Profile with no contact details and no subscriptions
    pub fn new(id: MemberId, name: impl Into<String>) -> Self {
        Self {
            id,
            member_code: None,
            name: name.into(),
            email: None,
            phone: None,
            network_password: None,
            statuses: Vec::new(),
        }
    }

    /// Router access this member should have right now
    pub fn desired_access(&self) -> DesiredAccess {
        desired_access(self.statuses.iter().copied())
    }
}

/// Source of member profiles for sync
pub trait MemberDirectory: Send + Sync {
    /// Every member, in a stable order
    fn members(&self) -> SyncResult<Vec<MemberProfile>>;

    /// One member
    fn member(&self, id: MemberId) -> SyncResult<Option<MemberProfile>>;

    /// Persist a generated hotspot password
    fn store_network_password(&self, id: MemberId, password: &str) -> SyncResult<()>;
}

/// In-memory directory
#[derive(Debug, Default)]
pub struct InMemoryMemberDirectory {
    members: RwLock<HashMap<MemberId, MemberProfile>>,
}

impl InMemoryMemberDirectory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile
    pub fn upsert(&self, profile: MemberProfile) {
        self.members.write().insert(profile.id, profile);
    }

    /// Replace a member's subscription statuses
    pub fn set_statuses(&self, id: MemberId, statuses: Vec<SubscriptionStatus>) -> SyncResult<()> {
        let mut members = self.members.write();
        let profile = members.get_mut(&id).ok_or(SyncError::MemberNotFound(id))?;
        profile.statuses = statuses;
        Ok(())
    }
}

impl MemberDirectory for InMemoryMemberDirectory {
    fn members(&self) -> SyncResult<Vec<MemberProfile>> {
        let mut all: Vec<MemberProfile> = self.members.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    fn member(&self, id: MemberId) -> SyncResult<Option<MemberProfile>> {
        Ok(self.members.read().get(&id).cloned())
    }

    fn store_network_password(&self, id: MemberId, password: &str) -> SyncResult<()> {
        let mut members = self.members.write();
        let profile = members.get_mut(&id).ok_or(SyncError::MemberNotFound(id))?;
        profile.network_password = Some(password.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desired_access_from_statuses() {
        let mut profile = MemberProfile::new(MemberId::new(), "Ada");
        assert_eq!(profile.desired_access(), DesiredAccess::Disabled);

        profile.statuses = vec![SubscriptionStatus::Expired, SubscriptionStatus::GracePeriod];
        assert_eq!(profile.desired_access(), DesiredAccess::Enabled);

        profile.statuses = vec![SubscriptionStatus::Pending, SubscriptionStatus::Suspended];
        assert_eq!(profile.desired_access(), DesiredAccess::Disabled);
    }

    #[test]
    fn test_store_network_password() {
        let dir = InMemoryMemberDirectory::new();
        let id = MemberId::new();
        dir.upsert(MemberProfile::new(id, "Grace"));

        dir.store_network_password(id, "k3yp4ss").unwrap();
        assert_eq!(
            dir.member(id).unwrap().unwrap().network_password.as_deref(),
            Some("k3yp4ss")
        );
        assert!(matches!(
            dir.store_network_password(MemberId::new(), "x"),
            Err(SyncError::MemberNotFound(_))
        ));
    }
}
