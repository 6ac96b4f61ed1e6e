//! # Money & Conversion
//!
//! Fixed-point monetary types for the two currencies the register handles.
//!
//! ## Why Two Types Instead of a Tagged Value?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE MIXED-CURRENCY PROBLEM                                             │
//! │                                                                         │
//! │  A sale is priced in USD but may be paid in bolívares (VES) at the     │
//! │  day's rate. The historical bug this core exists to fix came from      │
//! │  adding a USD figure to a VES figure without converting.               │
//! │                                                                         │
//! │  OUR SOLUTION: distinct newtypes                                        │
//! │    Usd(i64) + Ves(i64)  →  does not compile                            │
//! │    rate.to_ves(usd)     →  the only way across                         │
//! │                                                                         │
//! │  Cross-currency arithmetic is a type error, not a runtime check.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both types store integer minor units (cents / céntimos), so internal
//! accumulation never drifts; rounding to 2 decimals happens only when a
//! value crosses the conversion boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

use crate::error::{CoreError, CoreResult};

/// Scale factor for [`ExchangeRate`]: rates carry 4 decimal places.
pub const RATE_SCALE: i64 = 10_000;

// =============================================================================
// USD Amount
// =============================================================================

/// A USD amount in integer cents. Signed: reporting aggregation uses
/// negative values for cash outflows (expenses, supplier payments).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Usd(i64);

/// A VES amount in integer céntimos. Same representation as [`Usd`];
/// the distinct type is what keeps the currencies apart.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Ves(i64);

macro_rules! impl_money {
    ($name:ident, $sym:expr) => {
        impl $name {
            /// Creates a value from minor units (cents).
            #[inline]
            pub const fn from_cents(cents: i64) -> Self {
                $name(cents)
            }

            /// Returns the value in minor units.
            #[inline]
            pub const fn cents(&self) -> i64 {
                self.0
            }

            /// Zero amount.
            #[inline]
            pub const fn zero() -> Self {
                $name(0)
            }

            #[inline]
            pub const fn is_zero(&self) -> bool {
                self.0 == 0
            }

            #[inline]
            pub const fn is_positive(&self) -> bool {
                self.0 > 0
            }

            #[inline]
            pub const fn is_negative(&self) -> bool {
                self.0 < 0
            }

            /// Returns the absolute value.
            #[inline]
            pub const fn abs(&self) -> Self {
                $name(self.0.abs())
            }

            /// Multiplies by a quantity (line totals).
            #[inline]
            pub const fn multiply_quantity(&self, qty: i64) -> Self {
                $name(self.0 * qty)
            }

            /// Subtracts, clamping the result at zero.
            ///
            /// Used for debt math: a payment larger than the outstanding
            /// balance clamps to zero instead of going negative.
            #[inline]
            pub const fn sub_or_zero(&self, other: Self) -> Self {
                let diff = self.0 - other.0;
                if diff < 0 {
                    $name(0)
                } else {
                    $name(diff)
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let sign = if self.0 < 0 { "-" } else { "" };
                write!(
                    f,
                    "{}{}{}.{:02}",
                    sign,
                    $sym,
                    (self.0 / 100).abs(),
                    (self.0 % 100).abs()
                )
            }
        }

        impl Add for $name {
            type Output = Self;
            #[inline]
            fn add(self, other: Self) -> Self {
                $name(self.0 + other.0)
            }
        }

        impl AddAssign for $name {
            #[inline]
            fn add_assign(&mut self, other: Self) {
                self.0 += other.0;
            }
        }

        impl Sub for $name {
            type Output = Self;
            #[inline]
            fn sub(self, other: Self) -> Self {
                $name(self.0 - other.0)
            }
        }

        impl SubAssign for $name {
            #[inline]
            fn sub_assign(&mut self, other: Self) {
                self.0 -= other.0;
            }
        }

        impl Mul<i64> for $name {
            type Output = Self;
            #[inline]
            fn mul(self, qty: i64) -> Self {
                $name(self.0 * qty)
            }
        }
    };
}

impl_money!(Usd, "$");
impl_money!(Ves, "Bs ");

impl Usd {
    /// Applies a percentage discount expressed in basis points and returns
    /// the discount amount (not the discounted total).
    ///
    /// Half-up rounding in i128 so large subtotals cannot overflow.
    ///
    /// ## Example
    /// ```rust
    /// use caja_core::money::Usd;
    ///
    /// let subtotal = Usd::from_cents(2000); // $20.00
    /// assert_eq!(subtotal.discount_amount(1000).cents(), 200); // 10% = $2.00
    /// ```
    pub fn discount_amount(&self, discount_bps: u32) -> Usd {
        let amount = (self.0 as i128 * discount_bps as i128 + 5000) / 10000;
        Usd::from_cents(amount as i64)
    }
}

// =============================================================================
// Exchange Rate
// =============================================================================

/// VES-per-USD exchange rate, scaled by [`RATE_SCALE`] (4 decimal places).
///
/// The rate is captured at the moment of a transaction and frozen on the
/// resulting record; it is never recomputed from a "current" rate.
///
/// ## Example
/// ```rust
/// use caja_core::money::{ExchangeRate, Usd};
///
/// let rate = ExchangeRate::from_scaled(40_0000).unwrap(); // 40.0000 Bs/$
/// let total = Usd::from_cents(1800); // $18.00
/// assert_eq!(rate.to_ves(total).cents(), 72_000); // Bs 720.00
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExchangeRate(i64);

impl ExchangeRate {
    /// Creates a rate from its scaled representation (1e4 fixed point).
    ///
    /// Fails with [`CoreError::InvalidRate`] unless the rate is positive.
    pub fn from_scaled(scaled: i64) -> CoreResult<Self> {
        if scaled <= 0 {
            return Err(CoreError::InvalidRate { scaled });
        }
        Ok(ExchangeRate(scaled))
    }

    /// Creates a rate from a decimal value as delivered by the external
    /// rate feed. Input boundary only; everything downstream is fixed point.
    pub fn from_decimal(rate: f64) -> CoreResult<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(CoreError::InvalidRate { scaled: 0 });
        }
        ExchangeRate::from_scaled((rate * RATE_SCALE as f64).round() as i64)
    }

    /// Returns the scaled (1e4) representation for persistence.
    #[inline]
    pub const fn scaled(&self) -> i64 {
        self.0
    }

    /// Returns the rate as a decimal (display only).
    #[inline]
    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / RATE_SCALE as f64
    }

    /// Converts USD to VES at this rate: `ves = usd × rate`.
    pub fn to_ves(&self, usd: Usd) -> Ves {
        Ves::from_cents(div_round(
            usd.cents() as i128 * self.0 as i128,
            RATE_SCALE as i128,
        ))
    }

    /// Converts VES to USD at this rate: `usd = ves ÷ rate`.
    pub fn to_usd(&self, ves: Ves) -> Usd {
        Usd::from_cents(div_round(
            ves.cents() as i128 * RATE_SCALE as i128,
            self.0 as i128,
        ))
    }
}

/// Half-up division, symmetric around zero. `denom` must be positive.
fn div_round(numer: i128, denom: i128) -> i64 {
    let half = denom / 2;
    if numer >= 0 {
        ((numer + half) / denom) as i64
    } else {
        ((numer - half) / denom) as i64
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
