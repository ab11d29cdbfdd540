//! Commission recomputation.
//!
//! The commission amount is derived, never entered: it follows the offer
//! amount and percentage, and is always expressed in the offer's currency.

use propcrm_core::{DomainResult, Money, Percentage};

/// `amount * commission / 100`, rounded half-up, in `amount`'s currency.
pub fn commission_for(amount: Money, commission: Percentage) -> DomainResult<Money> {
    amount.percentage(commission)
}
