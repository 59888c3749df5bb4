//! Invoice aggregate
//!
//! # Invariants
//! - `number` is `None` while draft, set once on finalization, never changed
//! - amounts are recomputed together, `total = subtotal - discount + tax`
//! - only drafts are editable

use chrono::{DateTime, NaiveDate, Utc};
use hub_common::{EntityRef, EventMetadata, InvoiceId, InvoiceSettlement};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BillingError, BillingResult};
use crate::money::InvoiceAmounts;

/// Invoice status
///
/// | From           | To                                   |
/// |----------------|--------------------------------------|
/// | Draft          | Sent, Void                           |
/// | Sent           | Paid, Overdue, PartiallyPaid, Void   |
/// | Overdue        | Paid, PartiallyPaid, Void            |
/// | PartiallyPaid  | Paid, Overdue, Void                  |
/// | Paid, Void     | -                                    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    PartiallyPaid,
    Void,
}

impl InvoiceStatus {
    /// Every status
    pub const ALL: [InvoiceStatus; 6] = [
        Self::Draft,
        Self::Sent,
        Self::Paid,
        Self::Overdue,
        Self::PartiallyPaid,
        Self::Void,
    ];

    /// Statuses reachable from this one
    pub fn allowed_transitions(&self) -> &'static [InvoiceStatus] {
        use InvoiceStatus::*;
        match self {
            Draft => &[Sent, Void],
            Sent => &[Paid, Overdue, PartiallyPaid, Void],
            Overdue => &[Paid, PartiallyPaid, Void],
            PartiallyPaid => &[Paid, Overdue, Void],
            Paid | Void => &[],
        }
    }

    pub fn can_transition_to(&self, to: InvoiceStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Numbered and issued
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Sent | Self::Paid | Self::Overdue | Self::PartiallyPaid)
    }

    pub fn can_be_paid(&self) -> bool {
        matches!(self, Self::Sent | Self::Overdue | Self::PartiallyPaid)
    }

    pub fn can_be_voided(&self) -> bool {
        matches!(self, Self::Draft | Self::Sent | Self::Overdue)
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::PartiallyPaid => "partially_paid",
            Self::Void => "void",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoice for a billable entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Who pays (member, user, organization)
    pub billable: EntityRef,
    /// What caused it (subscription, booking)
    pub origin: Option<EntityRef>,
    pub status: InvoiceStatus,
    pub number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub amounts: InvoiceAmounts,
    pub currency: String,
    pub amount_paid: Decimal,
    pub paid_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    pub transaction_reference: Option<String>,
    pub gateway: Option<String>,
    pub description: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Unnumbered draft
    pub fn draft(
        billable: EntityRef,
        origin: Option<EntityRef>,
        amounts: InvoiceAmounts,
        currency: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InvoiceId::new(),
            billable,
            origin,
            status: InvoiceStatus::Draft,
            number: None,
            issue_date: None,
            due_date: None,
            amounts,
            currency: currency.into(),
            amount_paid: Decimal::ZERO,
            paid_at: None,
            voided_at: None,
            void_reason: None,
            transaction_reference: None,
            gateway: None,
            description: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sent and past due
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.status == InvoiceStatus::Sent && self.due_date.is_some_and(|due| due < today)
    }

    /// Status for business decisions on `today`
    ///
    /// A sent invoice past its due date reads as overdue even before the
    /// sweep persists it. Never mutates.
    pub fn effective_status(&self, today: NaiveDate) -> InvoiceStatus {
        if self.is_past_due(today) {
            InvoiceStatus::Overdue
        } else {
            self.status
        }
    }

    /// Recompute amounts; drafts only
    pub fn update_amounts(
        &mut self,
        subtotal: Decimal,
        discount_amount: Decimal,
        tax_rate: Decimal,
        now: DateTime<Utc>,
    ) -> BillingResult<()> {
        if !self.status.is_editable() {
            return Err(BillingError::NotEditable {
                id: self.id.as_uuid(),
                status: self.status.to_string(),
            });
        }
        self.amounts = InvoiceAmounts::compute(subtotal, discount_amount, tax_rate)?;
        self.updated_at = now;
        Ok(())
    }

    /// Outstanding amount
    pub fn balance_due(&self) -> Decimal {
        (self.amounts.total - self.amount_paid).max(Decimal::ZERO)
    }

    /// Move to `to` if the table allows it; returns the previous status
    pub fn transition(&mut self, to: InvoiceStatus, now: DateTime<Utc>) -> BillingResult<InvoiceStatus> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(BillingError::transition("invoice", from, to));
        }
        self.status = to;
        self.updated_at = now;
        Ok(from)
    }

    /// Draft → sent with its number and dates
    pub fn finalize(
        &mut self,
        number: String,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> BillingResult<()> {
        if self.number.is_some() {
            return Err(BillingError::Validation(format!("invoice {} is already numbered", self.id)));
        }
        self.transition(InvoiceStatus::Sent, now)?;
        self.number = Some(number);
        self.issue_date = Some(issue_date);
        self.due_date = Some(due_date);
        Ok(())
    }

    /// Event payload for a paid or voided invoice
    pub fn settlement(&self, reason: Option<String>, occurred_at: DateTime<Utc>) -> InvoiceSettlement {
        InvoiceSettlement {
            metadata: EventMetadata::new(occurred_at),
            invoice_id: self.id,
            number: self.number.clone(),
            billable: self.billable,
            origin: self.origin,
            total: self.amounts.total,
            currency: self.currency.clone(),
            transaction_reference: self.transaction_reference.clone(),
            gateway: self.gateway.clone(),
            reason,
        }
    }
}
