//! Exact invoice arithmetic
//!
//! ```text
//! taxable    = round2(subtotal - discount)
//! tax_amount = round2(taxable * tax_rate / 100)
//! total      = round2(subtotal - discount + tax_amount)
//! ```
//!
//! `round2` is banker's rounding (half to even) to two decimal places.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::MoneyError;

/// Round to cents, half to even
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Money-bearing invoice fields, always mutually consistent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAmounts {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    /// Percent, e.g. `15` for 15%
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

impl InvoiceAmounts {
    /// Validate inputs and derive tax and total
    pub fn compute(
        subtotal: Decimal,
        discount_amount: Decimal,
        tax_rate: Decimal,
    ) -> Result<Self, MoneyError> {
        if subtotal.is_sign_negative() && !subtotal.is_zero() {
            return Err(MoneyError::NegativeSubtotal);
        }
        if discount_amount.is_sign_negative() && !discount_amount.is_zero() {
            return Err(MoneyError::NegativeDiscount);
        }
        if discount_amount > subtotal {
            return Err(MoneyError::DiscountExceedsSubtotal);
        }
        if tax_rate.is_sign_negative() && !tax_rate.is_zero() {
            return Err(MoneyError::NegativeTaxRate);
        }

        let subtotal = round2(subtotal);
        let discount_amount = round2(discount_amount);
        let taxable = round2(subtotal - discount_amount);
        let tax_amount = round2(taxable * tax_rate / Decimal::ONE_HUNDRED);
        let total = round2(subtotal - discount_amount + tax_amount);
        if total.is_sign_negative() && !total.is_zero() {
            return Err(MoneyError::NegativeTotal);
        }

        Ok(Self {
            subtotal,
            discount_amount,
            tax_rate,
            tax_amount,
            total,
        })
    }

    /// Zero amounts
    pub fn zero() -> Self {
        Self {
            subtotal: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }

    /// `total == subtotal - discount + tax` to the cent
    pub fn is_consistent(&self) -> bool {
        self.total == round2(self.subtotal - self.discount_amount + self.tax_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_discount_and_tax() {
        let amounts = InvoiceAmounts::compute(dec!(100.00), dec!(10.00), dec!(15)).unwrap();
        assert_eq!(amounts.tax_amount, dec!(13.50));
        assert_eq!(amounts.total, dec!(103.50));
        assert!(amounts.is_consistent());
    }

    #[test]
    fn test_bankers_rounding() {
        assert_eq!(round2(dec!(2.345)), dec!(2.34));
        assert_eq!(round2(dec!(2.355)), dec!(2.36));
        assert_eq!(round2(dec!(-2.345)), dec!(-2.34));

        // 10.05 * 5% = 0.5025 -> 0.50
        let amounts = InvoiceAmounts::compute(dec!(10.05), dec!(0), dec!(5)).unwrap();
        assert_eq!(amounts.tax_amount, dec!(0.50));
        assert_eq!(amounts.total, dec!(10.55));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert_eq!(
            InvoiceAmounts::compute(dec!(-1), dec!(0), dec!(0)),
            Err(MoneyError::NegativeSubtotal)
        );
        assert_eq!(
            InvoiceAmounts::compute(dec!(10), dec!(-1), dec!(0)),
            Err(MoneyError::NegativeDiscount)
        );
        assert_eq!(
            InvoiceAmounts::compute(dec!(10), dec!(10.01), dec!(0)),
            Err(MoneyError::DiscountExceedsSubtotal)
        );
        assert_eq!(
            InvoiceAmounts::compute(dec!(10), dec!(0), dec!(-7.5)),
            Err(MoneyError::NegativeTaxRate)
        );
    }

    #[test]
    fn test_full_discount_is_zero_total() {
        let amounts = InvoiceAmounts::compute(dec!(50), dec!(50), dec!(7.5)).unwrap();
        assert_eq!(amounts.total, Decimal::ZERO);
    }

    fn cents() -> impl Strategy<Value = Decimal> {
        (0i64..10_000_000).prop_map(|c| Decimal::new(c, 2))
    }

    proptest! {
        #[test]
        fn test_total_identity_holds(
            subtotal in cents(),
            discount_ratio in 0u32..=100,
            rate_bp in 0i64..5_000,
        ) {
            let discount = round2(subtotal * Decimal::from(discount_ratio) / Decimal::ONE_HUNDRED);
            let tax_rate = Decimal::new(rate_bp, 2);
            let amounts = InvoiceAmounts::compute(subtotal, discount, tax_rate).unwrap();

            prop_assert!(amounts.is_consistent());
            prop_assert_eq!(amounts.total, amounts.subtotal - amounts.discount_amount + amounts.tax_amount);
            prop_assert!(amounts.tax_amount.scale() <= 2);
            prop_assert!(amounts.total >= Decimal::ZERO);
        }
    }
}
