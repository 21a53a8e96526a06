//! Integer fixed-point price units.
//!
//! Binary-outcome contracts are quoted in the [0, 1] range. Internally all
//! policy decisions are made on integer `cents` (1/100 of the payout) or
//! finer `pips` (1/100 of a cent). Decimal conversions exist only at the
//! gateway boundary and in logs, which keeps threshold comparisons free of
//! floating-point drift.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Number of pips in one cent.
pub const PIPS_PER_CENT: i64 = 100;

/// Price in integer cents of the contract payout.
///
/// Valid quotes lie in `0..=100`; the tradeable region is `1..=99`
/// (`0 < cents < 100`). Deltas may be negative, hence the signed inner type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(pub i64);

impl Cents {
    pub const ZERO: Self = Self(0);
    /// Full payout on resolution.
    pub const PAYOUT: Self = Self(100);

    #[inline]
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> i64 {
        self.0
    }

    /// A quote is tradeable iff `0 < cents < 100`.
    #[inline]
    #[must_use]
    pub fn is_tradeable(&self) -> bool {
        self.0 > 0 && self.0 < 100
    }

    /// The complementary price on the opposite token: `100 - cents`.
    #[inline]
    #[must_use]
    pub fn complement(&self) -> Self {
        Self(100 - self.0)
    }

    /// Clamp into the inclusive range `[lo, hi]`.
    #[inline]
    #[must_use]
    pub fn clamp(&self, lo: Self, hi: Self) -> Self {
        Self(self.0.clamp(lo.0, hi.0))
    }

    /// Convert a decimal quote in `[0, 1]` to cents, rounding half-up.
    ///
    /// Returns `None` when the input is not finite-representable in cents
    /// after rounding (outside `0..=100`).
    #[must_use]
    pub fn from_decimal_price(price: Decimal) -> Option<Self> {
        let scaled = (price * Decimal::from(100))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let v = scaled.to_i64()?;
        if (0..=100).contains(&v) {
            Some(Self(v))
        } else {
            None
        }
    }

    /// Decimal quote in `[0, 1]` for external APIs.
    #[inline]
    #[must_use]
    pub fn to_decimal_price(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(100)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}c", self.0)
    }
}

impl Add for Cents {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Cents {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Cents {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

/// Price in pips: 1 cent = 100 pips, 100 cents = payout.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Pips(pub i64);

impl Pips {
    pub const ZERO: Self = Self(0);

    #[inline]
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> i64 {
        self.0
    }

    /// Exact conversion from whole cents.
    #[inline]
    #[must_use]
    pub fn from_cents(cents: Cents) -> Self {
        Self(cents.0 * PIPS_PER_CENT)
    }

    /// Whole-cent value when the pip count is cent-aligned.
    #[inline]
    #[must_use]
    pub fn to_cents(&self) -> Option<Cents> {
        if self.0 % PIPS_PER_CENT == 0 {
            Some(Cents(self.0 / PIPS_PER_CENT))
        } else {
            None
        }
    }

    /// Cent value rounded toward zero, for display.
    #[inline]
    #[must_use]
    pub fn cents_trunc(&self) -> Cents {
        Cents(self.0 / PIPS_PER_CENT)
    }
}

impl fmt::Display for Pips {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.0)
    }
}

impl Add for Pips {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Pips {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl From<Cents> for Pips {
    fn from(c: Cents) -> Self {
        Self::from_cents(c)
    }
}
