//! # Money Module
//!
//! Provides the `Money` and `Percentage` types for handling monetary values
//! and rate arithmetic safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  The payment processor independently recomputes every total we send.   │
//! │  A single drifting cent means the request is rejected.                  │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Minor Units                                      │
//! │    Every amount is an i64 count of minor units (cents for USD/EUR).    │
//! │    Percentages are u32 basis points (825 = 8.25%).                     │
//! │    Each percentage sub-amount is rounded exactly once, half-to-even.   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use meridian_core::money::{Money, Percentage};
//!
//! let price = Money::from_cents(55_000); // 550.00
//! let rate = Percentage::from_bps(1000); // 10%
//! assert_eq!(price.percent_of(rate).cents(), 5_500);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents for USD/EUR).
///
/// ## Design Decisions
/// - **i64 (signed)**: discounts can drive intermediate amounts negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Currency-blind**: the currency code travels separately and only
///   matters at the wire boundary (see `CurrencyCode`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use meridian_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // 10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use meridian_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(11_000); // 110.00
    /// assert_eq!(unit_price.multiply_quantity(5).cents(), 55_000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Computes `self × rate` rounded to the nearest minor unit using
    /// banker's rounding (round half to even).
    ///
    /// ## Banker's Rounding Explained
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │  BANKERS ROUNDING (Round Half to Even)                              │
    /// │                                                                     │
    /// │  Standard rounding always rounds 0.5 UP, causing systematic bias:  │
    /// │    0.5 → 1, 1.5 → 2, 2.5 → 3, 3.5 → 4 (always up = +bias)         │
    /// │                                                                     │
    /// │  Bankers rounding rounds 0.5 to the nearest EVEN number:           │
    /// │    0.5 → 0, 1.5 → 2, 2.5 → 2, 3.5 → 4 (alternates = no bias)      │
    /// │                                                                     │
    /// │  The payment processor recomputes every percentage amount with     │
    /// │  this rule; anything else drifts off by a cent and gets rejected.  │
    /// └─────────────────────────────────────────────────────────────────────┘
    /// ```
    ///
    /// ## Implementation
    /// Integer math in i128: quotient and remainder of
    /// `amount × bps / 10000`, with the half-remainder tie broken toward
    /// the even quotient. Applied exactly once per computed sub-amount;
    /// rounded results are never re-rounded.
    ///
    /// ## Example
    /// ```rust
    /// use meridian_core::money::{Money, Percentage};
    ///
    /// // 10.01 at 2.5% = 0.25025 → 0.25
    /// let amount = Money::from_cents(1001);
    /// assert_eq!(amount.percent_of(Percentage::from_bps(250)).cents(), 25);
    ///
    /// // 10.00 at 0.25% = 0.025 → exactly half, rounds to even (0.02)
    /// let amount = Money::from_cents(1000);
    /// assert_eq!(amount.percent_of(Percentage::from_bps(25)).cents(), 2);
    /// ```
    pub fn percent_of(&self, rate: Percentage) -> Money {
        // i128 prevents overflow on large amounts
        let numerator = self.0 as i128 * rate.bps() as i128;
        let denominator = 10_000i128;

        let quotient = numerator.div_euclid(denominator);
        let remainder = numerator.rem_euclid(denominator);
        let half = denominator / 2;

        let rounded = if remainder > half || (remainder == half && quotient % 2 != 0) {
            quotient + 1
        } else {
            quotient
        };

        Money::from_cents(rounded as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for debugging and log output. Wire serialization goes through
/// `meridian-gateway`, which emits raw minor units plus a currency code.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

/// Addition of two Money values.
impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

/// Addition assignment (+=).
impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

/// Subtraction of two Money values.
impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

/// Subtraction assignment (-=).
impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by i64 (for quantity calculations).
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Percentage
// =============================================================================

/// A percentage rate in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 825 bps = 8.25%, enough resolution for every real-world discount,
/// tax, and service-charge rate without touching floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Percentage(u32);

impl Percentage {
    /// Creates a percentage from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Percentage(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        Percentage(0)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parses a decimal percent string ("8.25", "10", "10.5") into bps.
    ///
    /// Returns `None` for negative values, malformed input, or more than
    /// two fractional digits (sub-bps resolution does not round-trip).
    pub fn from_percent_str(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() || s.starts_with('-') {
            return None;
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if frac.len() > 2 {
            return None;
        }

        let whole: u32 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let frac_bps: u32 = if frac.is_empty() {
            0
        } else {
            let digits: u32 = frac.parse().ok()?;
            if frac.len() == 1 {
                digits * 10
            } else {
                digits
            }
        };

        // A parseable but astronomically large percent must not panic
        let bps = whole.checked_mul(100)?.checked_add(frac_bps)?;
        Some(Percentage(bps))
    }

    /// Formats as a decimal percent string for the wire format.
    ///
    /// ## Example
    /// ```rust
    /// use meridian_core::money::Percentage;
    ///
    /// assert_eq!(Percentage::from_bps(1000).to_percent_string(), "10");
    /// assert_eq!(Percentage::from_bps(825).to_percent_string(), "8.25");
    /// assert_eq!(Percentage::from_bps(1050).to_percent_string(), "10.5");
    /// ```
    pub fn to_percent_string(&self) -> String {
        let whole = self.0 / 100;
        let frac = self.0 % 100;
        if frac == 0 {
            format!("{}", whole)
        } else if frac % 10 == 0 {
            format!("{}.{}", whole, frac / 10)
        } else {
            format!("{}.{:02}", whole, frac)
        }
    }
}

impl Default for Percentage {
    fn default() -> Self {
        Percentage::zero()
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.to_percent_string())
    }
}

// =============================================================================
// Currency Code
// =============================================================================

/// ISO 4217 currency code (e.g. "USD", "EUR").
///
/// Core arithmetic never consults the currency; it exists so that the
/// wire-format builder can emit `{ amount, currency }` money objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Creates a currency code, uppercasing the input.
    pub fn new(code: impl Into<String>) -> Self {
        CurrencyCode(code.into().to_ascii_uppercase())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
