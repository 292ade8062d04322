//! A fiat amount newtype which maintains some useful internal invariants and
//! provides the coin-count arithmetic used when pricing a payout.
//!
//! Note that we don't impl `From<Decimal>` or [`FromStr`] because calling code
//! should be explicit about validation: parse user input with
//! `Decimal::from_str`, then call [`Amount::try_from_decimal`].
//!
//! [`FromStr`]: std::str::FromStr

use std::{
    fmt::{self, Display},
    ops::Add,
};

use rust_decimal::{prelude::ToPrimitive, Decimal};
use rust_decimal_macros::dec;
use serde::{de, Deserialize, Deserializer, Serialize};

/// Errors that can occur when attempting to construct an [`Amount`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("amount is negative")]
    Negative,
    #[error("amount has more than two fractional digits")]
    TooPrecise,
    #[error("amount is too large")]
    TooLarge,
}

/// A fiat amount, internally represented as a [`Decimal`], which provides the
/// following properties:
///
/// - The contained value is non-negative.
/// - The contained value has at most two fractional digits.
/// - The contained value is no greater than [`Amount::MAX`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct Amount(Decimal);

impl Amount {
    /// An [`Amount`] of zero.
    pub const ZERO: Self = Self(dec!(0));

    /// The maximum [`Amount`] this type can represent. Far above any
    /// configured per-transaction cap; primarily a sanity bound.
    pub const MAX: Self = Self(dec!(1_000_000_000));

    // --- Constructors --- //

    /// Construct an [`Amount`] from a [`Decimal`] value, validating the
    /// non-negativity, precision, and size invariants.
    pub fn try_from_decimal(value: Decimal) -> Result<Self, Error> {
        if value.is_sign_negative() {
            return Err(Error::Negative);
        }
        if value.scale() > 2 && value.round_dp(2) != value {
            return Err(Error::TooPrecise);
        }
        if value > Self::MAX.0 {
            return Err(Error::TooLarge);
        }
        // Pin the scale to exactly two fractional digits so "5", "5.0" and
        // "5.00" are one representation on the wire and in the database.
        let mut value = value.round_dp(2);
        value.rescale(2);
        Ok(Self(value))
    }

    /// Construct an [`Amount`] from a whole number of cents.
    pub fn from_cents(cents: u32) -> Self {
        let mut value = Decimal::from(cents) / dec!(100);
        value.rescale(2);
        Self(value)
    }

    // --- Getters --- //

    /// Returns the contained [`Decimal`].
    #[inline]
    pub fn to_decimal(self) -> Decimal {
        self.0
    }

    /// Whether this amount is strictly greater than zero.
    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    // --- Arithmetic --- //

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        let inner = self.0.checked_add(rhs.0)?;
        Self::try_from_decimal(inner).ok()
    }

    /// The number of coins required to cover this amount at the given coin
    /// unit: `ceil(amount / unit)`.
    ///
    /// Returns [`None`] if `unit` is not strictly positive or the count
    /// overflows a [`u32`] (both indicate a misconfiguration, not user
    /// input).
    pub fn coins_at_unit(self, unit: Amount) -> Option<u32> {
        if !unit.is_positive() {
            return None;
        }
        let count = (self.0 / unit.0).ceil();
        count.to_u32()
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(rhs)
            .expect("Overflowed when adding amounts")
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Always show two fractional digits: "5.50", not "5.5".
        write!(f, "{:.2}", self.0)
    }
}

/// Enforces the [`Amount`] invariants on deserialization.
impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Amount::try_from_decimal(value).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    fn amt(s: &str) -> Amount {
        Amount::try_from_decimal(Decimal::from_str(s).unwrap()).unwrap()
    }

    #[test]
    fn construction_enforces_invariants() {
        assert!(Amount::try_from_decimal(dec!(-0.01)).is_err());
        assert!(Amount::try_from_decimal(dec!(1.001)).is_err());
        assert!(Amount::try_from_decimal(dec!(2_000_000_000)).is_err());
        assert!(Amount::try_from_decimal(dec!(0)).is_ok());
        assert!(Amount::try_from_decimal(dec!(5.00)).is_ok());
    }

    #[test]
    fn coin_count_rounds_up() {
        let quarter = amt("0.25");
        assert_eq!(amt("5.00").coins_at_unit(quarter), Some(20));
        assert_eq!(amt("5.01").coins_at_unit(quarter), Some(21));
        assert_eq!(amt("0.01").coins_at_unit(quarter), Some(1));
        assert_eq!(amt("0").coins_at_unit(quarter), Some(0));
        assert_eq!(amt("1").coins_at_unit(Amount::ZERO), None);
    }

    #[test]
    fn add_fee() {
        assert_eq!(amt("5.00") + amt("0.50"), amt("5.50"));
    }

    #[test]
    fn display_two_digits() {
        assert_eq!(amt("5.5").to_string(), "5.50");
        assert_eq!(amt("5").to_string(), "5.00");
    }

    #[test]
    fn deserialize_enforces_invariants() {
        assert!(serde_json::from_str::<Amount>("\"5.00\"").is_ok());
        assert!(serde_json::from_str::<Amount>("\"-1\"").is_err());
        assert!(serde_json::from_str::<Amount>("\"1.999\"").is_err());
    }
}
