//! Domain Events - Record significant occurrences in the membership core
//!
//! Events are:
//! - Immutable snapshots taken when the transition committed
//! - Named in past tense
//! - Ordered per aggregate (subscription or invoice) on delivery

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{EntityRef, InvoiceId, MemberId, SubscriptionId};
use crate::status::SubscriptionStatus;

/// Base event metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event ID
    pub event_id: Uuid,
    /// When the underlying transition committed
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    /// New metadata with a fresh event id
    pub fn new(occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at,
        }
    }
}

/// Subscription status change payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTransition {
    pub metadata: EventMetadata,
    pub subscription_id: SubscriptionId,
    pub member_id: MemberId,
    pub old_status: SubscriptionStatus,
    pub new_status: SubscriptionStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Cancellation or suspension reason
    pub reason: Option<String>,
}

/// Invoice paid/voided payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSettlement {
    pub metadata: EventMetadata,
    pub invoice_id: InvoiceId,
    pub number: Option<String>,
    pub billable: EntityRef,
    pub origin: Option<EntityRef>,
    pub total: Decimal,
    pub currency: String,
    pub transaction_reference: Option<String>,
    pub gateway: Option<String>,
    /// Void reason
    pub reason: Option<String>,
}

/// Outbound domain events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum DomainEvent {
    /// pending → active
    SubscriptionActivated(SubscriptionTransition),
    /// expired|cancelled → active with a fresh period
    SubscriptionRenewed(SubscriptionTransition),
    /// → expired
    SubscriptionExpired(SubscriptionTransition),
    /// → cancelled
    SubscriptionCancelled(SubscriptionTransition),
    /// → suspended
    SubscriptionSuspended(SubscriptionTransition),
    /// Invoice settled in full
    InvoicePaid(InvoiceSettlement),
    /// Invoice voided
    InvoiceVoided(InvoiceSettlement),
}

impl DomainEvent {
    /// Dotted event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubscriptionActivated(_) => "subscription.activated",
            Self::SubscriptionRenewed(_) => "subscription.renewed",
            Self::SubscriptionExpired(_) => "subscription.expired",
            Self::SubscriptionCancelled(_) => "subscription.cancelled",
            Self::SubscriptionSuspended(_) => "subscription.suspended",
            Self::InvoicePaid(_) => "invoice.paid",
            Self::InvoiceVoided(_) => "invoice.voided",
        }
    }

    /// Event metadata
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::SubscriptionActivated(t)
            | Self::SubscriptionRenewed(t)
            | Self::SubscriptionExpired(t)
            | Self::SubscriptionCancelled(t)
            | Self::SubscriptionSuspended(t) => &t.metadata,
            Self::InvoicePaid(s) | Self::InvoiceVoided(s) => &s.metadata,
        }
    }

    /// Subscription payload, for subscription events
    pub fn subscription(&self) -> Option<&SubscriptionTransition> {
        match self {
            Self::SubscriptionActivated(t)
            | Self::SubscriptionRenewed(t)
            | Self::SubscriptionExpired(t)
            | Self::SubscriptionCancelled(t)
            | Self::SubscriptionSuspended(t) => Some(t),
            Self::InvoicePaid(_) | Self::InvoiceVoided(_) => None,
        }
    }

    /// Invoice payload, for invoice events
    pub fn invoice(&self) -> Option<&InvoiceSettlement> {
        match self {
            Self::InvoicePaid(s) | Self::InvoiceVoided(s) => Some(s),
            _ => None,
        }
    }

    /// Aggregate id whose events must be delivered in publish order
    pub fn ordering_key(&self) -> Uuid {
        match self {
            Self::InvoicePaid(s) | Self::InvoiceVoided(s) => s.invoice_id.as_uuid(),
            _ => self
                .subscription()
                .map(|t| t.subscription_id.as_uuid())
                .unwrap_or_default(),
        }
    }

    /// Member the event concerns, when known
    pub fn member_id(&self) -> Option<MemberId> {
        match self {
            Self::InvoicePaid(s) | Self::InvoiceVoided(s) => s.billable.as_member(),
            _ => self.subscription().map(|t| t.member_id),
        }
    }
}
