//! Fixed-point money in minor currency units
//!
//! All stored amounts are integer cents. Products with portions and
//! quantities are carried as exact `Decimal` minor units and only turned back
//! into `Cents` through [`Cents::round`], which rounds half away from zero.

use crate::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// Amount in minor currency units (cents)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(i64);

impl Cents {
    /// Zero cents
    pub const ZERO: Cents = Cents(0);

    /// Largest amount a receipt or item may declare ($100 billion)
    pub const MAX_AMOUNT: Cents = Cents(10_000_000_000_000);

    /// Create from a raw minor-unit count
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Raw minor-unit count
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Exact value in minor units as a decimal
    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.0)
    }

    /// Round an exact minor-unit amount to whole cents, half away from zero.
    ///
    /// Saturates at the `i64` range.
    pub fn round(minor_units: Decimal) -> Self {
        let rounded = minor_units.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        Self(rounded.to_i64().unwrap_or(if rounded.is_sign_negative() {
            i64::MIN
        } else {
            i64::MAX
        }))
    }

    /// Round to whole cents, or `None` outside the `i64` range
    pub fn try_round(minor_units: Decimal) -> Option<Self> {
        minor_units
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Self)
    }

    /// Exact product with a quantity or portion, in minor units.
    ///
    /// Callers pass amounts bounded by [`Cents::MAX_AMOUNT`]; use
    /// [`Cents::checked_times`] for anything else.
    pub fn times(self, factor: Decimal) -> Decimal {
        self.to_decimal() * factor
    }

    /// Exact product, or `None` if it does not fit a `Decimal`
    pub fn checked_times(self, factor: Decimal) -> Option<Decimal> {
        self.to_decimal().checked_mul(factor)
    }

    /// Whether the magnitude is within [`Cents::MAX_AMOUNT`]
    pub fn is_within_limit(&self) -> bool {
        self.0.unsigned_abs() <= Self::MAX_AMOUNT.0.unsigned_abs()
    }

    /// Parse a user-entered major-unit amount such as `"12.50"`, `"$1,234.5"`
    /// or `"-3"`.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let cleaned: String = rest
            .trim_start_matches('$')
            .chars()
            .filter(|c| *c != ',')
            .collect();

        if cleaned.is_empty() {
            return Err(Error::Configuration(format!("Empty amount: {:?}", text)));
        }

        let major = Decimal::from_str(&cleaned)
            .map_err(|e| Error::Configuration(format!("Invalid amount {:?}: {}", text, e)))?;
        let major = if negative { -major } else { major };

        major
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(Self::try_round)
            .ok_or_else(|| Error::Configuration(format!("Amount {:?} is out of range", text)))
    }

    /// Whether the amount is below zero
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Whether the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl FromStr for Cents {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}

// Arithmetic saturates at the `i64` range

impl Add for Cents {
    type Output = Cents;

    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Cents) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Cents {
    type Output = Cents;

    fn sub(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Cents {
    fn sub_assign(&mut self, rhs: Cents) {
        self.0 = self.0.saturating_sub(rhs.0);
    }
}

impl Neg for Cents {
    type Output = Cents;

    fn neg(self) -> Cents {
        Cents(self.0.saturating_neg())
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Cents {
        iter.fold(Cents::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Cents> for Cents {
    fn sum<I: Iterator<Item = &'a Cents>>(iter: I) -> Cents {
        iter.copied().sum()
    }
}
