//! Subscription status and the desired network-access state derived from it

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription status
///
/// # State Transition Rules
///
/// | From          | To                                               |
/// |---------------|--------------------------------------------------|
/// | Pending       | Active, Suspended                                |
/// | Active        | Expiring, GracePeriod, Expired, Cancelled, Suspended |
/// | Expiring      | GracePeriod, Expired, Cancelled, Suspended       |
/// | GracePeriod   | Expired, Cancelled, Suspended                    |
/// | Expired       | Active (renew), Suspended                        |
/// | Cancelled     | Active (renew), Suspended                        |
/// | Suspended     | -                                                |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Created, awaiting first payment
    Pending,
    /// Paid and running
    Active,
    /// Running, end date inside the warning window
    Expiring,
    /// Past end date, access kept until the grace window closes
    GracePeriod,
    /// Ended
    Expired,
    /// Ended early by admin or member
    Cancelled,
    /// Blocked, e.g. after a failed recurring payment
    Suspended,
}

impl SubscriptionStatus {
    /// Every status, in lifecycle order
    pub const ALL: [SubscriptionStatus; 7] = [
        Self::Pending,
        Self::Active,
        Self::Expiring,
        Self::GracePeriod,
        Self::Expired,
        Self::Cancelled,
        Self::Suspended,
    ];

    /// Statuses reachable from this one
    pub fn allowed_transitions(&self) -> &'static [SubscriptionStatus] {
        use SubscriptionStatus::*;
        match self {
            Pending => &[Active, Suspended],
            Active => &[Expiring, GracePeriod, Expired, Cancelled, Suspended],
            Expiring => &[GracePeriod, Expired, Cancelled, Suspended],
            GracePeriod => &[Expired, Cancelled, Suspended],
            Expired => &[Active, Suspended],
            Cancelled => &[Active, Suspended],
            Suspended => &[],
        }
    }

    /// Check transition against the table
    pub fn can_transition_to(&self, to: SubscriptionStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Active, expiring or in grace
    pub fn is_active_like(&self) -> bool {
        matches!(self, Self::Active | Self::Expiring | Self::GracePeriod)
    }

    /// Statuses the lifecycle sweep re-evaluates
    pub fn is_time_sensitive(&self) -> bool {
        self.is_active_like()
    }

    /// Statuses that keep hotspot access enabled
    pub fn grants_network_access(&self) -> bool {
        self.is_active_like()
    }

    /// Statuses a renewal may start from
    pub fn is_renewable(&self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled)
    }

    /// Rank used to pick a member's headline status across subscriptions
    pub fn priority(&self) -> u8 {
        match self {
            Self::Active => 7,
            Self::Expiring => 6,
            Self::GracePeriod => 5,
            Self::Pending => 4,
            Self::Suspended => 3,
            Self::Expired => 2,
            Self::Cancelled => 1,
        }
    }

    /// Snake-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Expiring => "expiring",
            Self::GracePeriod => "grace_period",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::Suspended => "suspended",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hotspot state that should exist on the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredAccess {
    /// User enabled with an up-to-date profile
    Enabled,
    /// User disabled and any session kicked
    Disabled,
}

/// Desired access for a member holding the given subscription statuses
///
/// Enabled iff at least one subscription grants access; no subscription at
/// all means disabled.
pub fn desired_access<I>(statuses: I) -> DesiredAccess
where
    I: IntoIterator<Item = SubscriptionStatus>,
{
    if statuses.into_iter().any(|s| s.grants_network_access()) {
        DesiredAccess::Enabled
    } else {
        DesiredAccess::Disabled
    }
}
