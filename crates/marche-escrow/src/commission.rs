//! Commission calculator
//!
//! `commission = round_half_up(total * rate)` and `seller = total - commission`.
//! The seller leg is always derived by subtraction so the two legs sum to
//! the total exactly.

use marche_types::{CommissionRate, MinorUnits};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::{EscrowError, Result};

/// Seller and platform shares of a total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionSplit {
    pub seller_amount: MinorUnits,
    pub commission_amount: MinorUnits,
}

/// Split `total_amount` at a raw `commission_rate`.
///
/// Fails with `InvalidAmount` for a negative total and `InvalidRate` for a
/// rate outside `[0, 1]`.
pub fn compute(total_amount: MinorUnits, commission_rate: Decimal) -> Result<CommissionSplit> {
    let rate = CommissionRate::new(commission_rate)?;
    split(total_amount, rate)
}

/// Split `total_amount` at an already validated rate
pub fn split(total_amount: MinorUnits, rate: CommissionRate) -> Result<CommissionSplit> {
    if total_amount.is_negative() {
        return Err(EscrowError::InvalidAmount {
            message: format!("total amount must not be negative, got {}", total_amount),
        });
    }

    let commission = (Decimal::from(total_amount.0) * rate.as_decimal())
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| EscrowError::InvalidAmount {
            message: format!("commission on {} does not fit in minor units", total_amount),
        })?;

    let commission_amount = MinorUnits(commission);
    let seller_amount = total_amount
        .checked_sub(commission_amount)
        .ok_or_else(|| EscrowError::InvalidAmount {
            message: format!("seller share of {} overflows", total_amount),
        })?;

    Ok(CommissionSplit {
        seller_amount,
        commission_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_standard_split() {
        let split = compute(MinorUnits(100_000), dec!(0.15)).unwrap();
        assert_eq!(split.seller_amount, MinorUnits(85_000));
        assert_eq!(split.commission_amount, MinorUnits(15_000));
    }

    #[test]
    fn test_half_rounds_up() {
        // 0.5 of a minor unit goes to the platform
        let split = compute(MinorUnits(5), dec!(0.1)).unwrap();
        assert_eq!(split.commission_amount, MinorUnits(1));
        assert_eq!(split.seller_amount, MinorUnits(4));

        let split = compute(MinorUnits(14), dec!(0.1)).unwrap();
        assert_eq!(split.commission_amount, MinorUnits(1));
    }

    #[test]
    fn test_bounds() {
        assert_eq!(
            compute(MinorUnits(999), Decimal::ZERO).unwrap().seller_amount,
            MinorUnits(999)
        );
        assert_eq!(
            compute(MinorUnits(999), Decimal::ONE).unwrap().commission_amount,
            MinorUnits(999)
        );
        assert_eq!(
            compute(MinorUnits(0), dec!(0.15)).unwrap().commission_amount,
            MinorUnits(0)
        );
    }

    #[test]
    fn test_conservation_over_awkward_rates() {
        let rates = [dec!(0.0333), dec!(0.125), dec!(0.175), dec!(0.999), dec!(0.0001)];
        for total in [1_i64, 7, 99, 1_001, 123_457, 9_999_999_999] {
            for rate in rates {
                let split = compute(MinorUnits(total), rate).unwrap();
                assert_eq!(split.seller_amount.0 + split.commission_amount.0, total);
                assert!(!split.seller_amount.is_negative());
                assert!(!split.commission_amount.is_negative());
            }
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            compute(MinorUnits(-1), dec!(0.1)),
            Err(EscrowError::InvalidAmount { .. })
        ));
        assert!(matches!(
            compute(MinorUnits(100), dec!(1.01)),
            Err(EscrowError::InvalidRate { .. })
        ));
        assert!(matches!(
            compute(MinorUnits(100), dec!(-0.01)),
            Err(EscrowError::InvalidRate { .. })
        ));
    }
}
