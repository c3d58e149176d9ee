//! Monetary amounts with exactly two fractional digits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Number of fractional digits every persisted amount carries.
pub const MONEY_SCALE: u32 = 2;

/// A signed amount of money, fixed at [`MONEY_SCALE`] fractional digits.
///
/// Construction rejects values that would lose precision (e.g. `1.005`), so
/// arithmetic on `Money` never rounds. Arithmetic is checked: overflow is
/// reported as a [`DomainError`], never a panic.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Build from a decimal, rejecting more than two significant fractional digits.
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.normalize().scale() > MONEY_SCALE {
            return Err(DomainError::ExcessPrecision {
                value: value.to_string(),
                max_scale: MONEY_SCALE,
            });
        }
        let mut value = value;
        value.rescale(MONEY_SCALE);
        Ok(Self(value))
    }

    /// Build from an integer number of minor units (cents).
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, MONEY_SCALE))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::Overflow(format!("{self} + {other}")))
    }

    pub fn checked_sub(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::Overflow(format!("{self} - {other}")))
    }

    pub fn negate(self) -> Money {
        Money(-self.0)
    }

    /// Zero when negative, otherwise unchanged.
    pub fn floor_zero(self) -> Money {
        if self.is_negative() { Money::ZERO } else { self }
    }
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
