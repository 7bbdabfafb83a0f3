//! Amounts of money in the smallest currency unit.

use core::fmt;
use core::iter::Sum;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Non-negative amount in minor units (cents).
///
/// Arithmetic is checked; overflow is reported as a validation error rather
/// than wrapping.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }

    pub fn checked_sub(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("amount would go below zero"))
    }

    pub fn checked_mul(self, qty: u32) -> DomainResult<Money> {
        self.0
            .checked_mul(u64::from(qty))
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }

    /// Signed view used by ledger entries.
    pub fn as_signed(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl From<u64> for Money {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        Money(iter.map(|m| m.0).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn subtraction_below_zero_is_rejected() {
        let err = Money::from_minor(5).checked_sub(Money::from_minor(6)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn displays_major_and_minor_units() {
        assert_eq!(Money::from_minor(1205).to_string(), "12.05");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    proptest! {
        #[test]
        fn add_then_sub_is_identity(a in 0u64..1_000_000_000, b in 0u64..1_000_000_000) {
            let a = Money::from_minor(a);
            let b = Money::from_minor(b);
            prop_assert_eq!(a.checked_add(b).unwrap().checked_sub(b).unwrap(), a);
        }
    }
}
