//! Lifecycle engine configuration

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};

/// `[lifecycle]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Days before the end date an active subscription becomes expiring
    pub expiry_warning_days: u32,
    /// Days from issue to due date
    pub invoice_due_days: u32,
    pub invoice_number_prefix: String,
    /// Percent used for invoices that don't name one
    pub default_tax_rate: Decimal,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            expiry_warning_days: 7,
            invoice_due_days: 14,
            invoice_number_prefix: "INV".to_string(),
            default_tax_rate: Decimal::ZERO,
        }
    }
}

impl LifecycleConfig {
    pub fn validate(&self) -> BillingResult<()> {
        let prefix = &self.invoice_number_prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(BillingError::Validation(format!(
                "invoice_number_prefix must be non-empty and alphanumeric, got {:?}",
                prefix
            )));
        }
        if self.default_tax_rate.is_sign_negative() && !self.default_tax_rate.is_zero() {
            return Err(BillingError::Validation("default_tax_rate must not be negative".into()));
        }
        Ok(())
    }
}
