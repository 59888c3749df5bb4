//! Identifiers and polymorphic entity references
//!
//! Invoices and payments point at "some entity" (a member, a booking, a
//! subscription). Instead of resolving classes dynamically, references are a
//! tagged `{kind, id}` pair that callers dispatch on explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Get inner UUID
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| IdError::InvalidUuid(s.to_string()))
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Member identifier (person or organization)
    MemberId
);
uuid_id!(
    /// Subscription identifier
    SubscriptionId
);
uuid_id!(
    /// Invoice identifier
    InvoiceId
);

/// Identifier parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Not a UUID
    #[error("invalid uuid: {0}")]
    InvalidUuid(String),
    /// Plan slug rejected
    #[error("invalid plan id: {0}")]
    InvalidPlanId(String),
}

/// Plan identifier (Value Object)
///
/// # Invariants
/// - Must be non-empty
/// - Max 64 characters
/// - Alphanumeric with hyphens or underscores only
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlanId(String);

impl PlanId {
    /// Create new plan ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();

        if id.is_empty() {
            return Err(IdError::InvalidPlanId("cannot be empty".into()));
        }
        if id.len() > 64 {
            return Err(IdError::InvalidPlanId("max 64 characters".into()));
        }
        if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Err(IdError::InvalidPlanId(format!("{id}: alphanumeric only")));
        }

        Ok(Self(id))
    }

    /// Get inner value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PlanId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlanId> for String {
    fn from(id: PlanId) -> Self {
        id.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of entity a polymorphic reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Coworking member
    Member,
    /// Platform user account
    User,
    /// Organization (company membership)
    Organization,
    /// Membership subscription
    Subscription,
    /// Space booking
    Booking,
    /// Event registration
    EventRegistration,
    /// Invoice
    Invoice,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Member => "member",
            Self::User => "user",
            Self::Organization => "organization",
            Self::Subscription => "subscription",
            Self::Booking => "booking",
            Self::EventRegistration => "event_registration",
            Self::Invoice => "invoice",
        };
        f.write_str(name)
    }
}

/// Tagged reference to an entity owned by another module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity kind
    pub kind: EntityKind,
    /// Entity id
    pub id: Uuid,
}

impl EntityRef {
    /// Create a reference
    pub const fn new(kind: EntityKind, id: Uuid) -> Self {
        Self { kind, id }
    }

    /// Reference to a member
    pub const fn member(id: MemberId) -> Self {
        Self::new(EntityKind::Member, id.as_uuid())
    }

    /// Reference to a subscription
    pub const fn subscription(id: SubscriptionId) -> Self {
        Self::new(EntityKind::Subscription, id.as_uuid())
    }

    /// Reference to an invoice
    pub const fn invoice(id: InvoiceId) -> Self {
        Self::new(EntityKind::Invoice, id.as_uuid())
    }

    /// Member id, if this references a member
    pub fn as_member(&self) -> Option<MemberId> {
        (self.kind == EntityKind::Member).then(|| MemberId::from_uuid(self.id))
    }

    /// Subscription id, if this references a subscription
    pub fn as_subscription(&self) -> Option<SubscriptionId> {
        (self.kind == EntityKind::Subscription).then(|| SubscriptionId::from_uuid(self.id))
    }

    /// Invoice id, if this references an invoice
    pub fn as_invoice(&self) -> Option<InvoiceId> {
        (self.kind == EntityKind::Invoice).then(|| InvoiceId::from_uuid(self.id))
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_id_validation() {
        assert!(PlanId::new("hot-desk_monthly").is_ok());
        assert!(PlanId::new("").is_err());
        assert!(PlanId::new("a".repeat(65)).is_err());
        assert!(PlanId::new("hot desk").is_err());
    }

    #[test]
    fn test_plan_id_serde_rejects_invalid() {
        let ok: Result<PlanId, _> = serde_json::from_str("\"dedicated-office\"");
        assert!(ok.is_ok());
        let bad: Result<PlanId, _> = serde_json::from_str("\"no spaces!\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_entity_ref_narrowing() {
        let member = MemberId::new();
        let r = EntityRef::member(member);
        assert_eq!(r.as_member(), Some(member));
        assert_eq!(r.as_subscription(), None);
        assert_eq!(r.to_string(), format!("member:{}", member));
    }

    #[test]
    fn test_id_parse() {
        let id = MemberId::new();
        let parsed: MemberId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<MemberId>().is_err());
    }
}
