//! # HubSpace Billing
//!
//! Lifecycle engine for membership subscriptions and invoices.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          hub-billing                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  PaymentCompleted ──► PaymentConfirmations (by EntityKind)       │
//! │                             │                                    │
//! │  hubctl process-lifecycle ──┤                                    │
//! │                             ▼                                    │
//! │  SubscriptionManager    InvoiceManager ──► InvoiceNumberSequence │
//! │          │                    │                                  │
//! │          ▼                    ▼                                  │
//! │  SubscriptionRepository  InvoiceRepository  (version CAS)        │
//! │          │                    │                                  │
//! │          └──────► EventPublisher ◄──────┘                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - Every status change follows the transition tables; anything else is an
//!   [`BillingError::InvalidStateTransition`] and changes nothing
//! - Money is exact decimal with banker's rounding to cents
//! - Events are published only after the change is stored
//! - A sent invoice past its due date reads as overdue before any sweep

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod invoice;
pub mod invoicing;
pub mod lifecycle;
pub mod money;
pub mod numbering;
pub mod payments;
pub mod plan;
pub mod repository;
pub mod subscription;

pub use config::LifecycleConfig;
pub use engine::{BillingEngine, BillingStores, LifecycleRunReport};
pub use error::{BillingError, BillingResult, MoneyError};
pub use invoice::{Invoice, InvoiceStatus};
pub use invoicing::{DraftInvoice, InvoiceManager, OverdueSweepReport};
pub use lifecycle::{LifecycleSweepReport, SubscriptionManager};
pub use money::{round2, InvoiceAmounts};
pub use numbering::{format_number, period_of, InMemoryInvoiceSequence, InvoiceNumberSequence};
pub use payments::{
    InvoicePayments, PayableHandler, PaymentCompleted, PaymentConfirmations, PaymentOutcome,
    SubscriptionPayments,
};
pub use plan::{InMemoryPlanCatalog, Plan, PlanCatalog, PlanDuration, PlanSnapshot};
pub use repository::{
    InMemoryInvoiceRepository, InMemorySubscriptionRepository, InvoiceRepository,
    SubscriptionRepository,
};
pub use subscription::Subscription;
