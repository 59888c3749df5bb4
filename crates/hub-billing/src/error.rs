//! Error types for the lifecycle engine

use thiserror::Error;
use uuid::Uuid;

/// Invoice arithmetic invariant violations; never clamped
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyError {
    #[error("subtotal must not be negative")]
    NegativeSubtotal,
    #[error("discount must not be negative")]
    NegativeDiscount,
    #[error("discount exceeds subtotal")]
    DiscountExceedsSubtotal,
    #[error("tax rate must not be negative")]
    NegativeTaxRate,
    #[error("total must not be negative")]
    NegativeTotal,
}

/// Lifecycle engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Transition not in the allowed table; nothing was changed
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidStateTransition {
        /// `subscription` or `invoice`
        entity: &'static str,
        /// Current status
        from: String,
        /// Attempted status
        to: String,
    },

    /// Record changed since it was read
    #[error("{entity} {id} was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification {
        /// Entity kind
        entity: &'static str,
        /// Entity id
        id: Uuid,
        /// Version the caller read
        expected: u64,
        /// Version in the store
        actual: u64,
    },

    /// Invoice arithmetic rejected
    #[error("money calculation error: {0}")]
    MoneyCalculation(#[from] MoneyError),

    /// Unknown record
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Requested id
        id: String,
    },

    /// Invoice no longer editable
    #[error("invoice {id} is {status} and can no longer be edited")]
    NotEditable {
        /// Invoice id
        id: Uuid,
        /// Current status
        status: String,
    },

    /// Caller input rejected
    #[error("validation error: {0}")]
    Validation(String),
}

impl BillingError {
    pub(crate) fn transition(entity: &'static str, from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStateTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Optimistic-lock conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

/// Result alias for the lifecycle engine
pub type BillingResult<T> = Result<T, BillingError>;
