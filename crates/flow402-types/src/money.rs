//! Credit amounts.
//!
//! Flow402 balances are non-negative 64-bit integers of "credits" (100 credits ==
//! 1 USDC); there is no floating point and no currency conversion anywhere in the
//! core. [`Credits`] wraps a strictly positive amount — the shape
//! every mutation operation (`credit`, `debit`) actually takes as input — so the
//! "amount must be positive" check happens once, at construction, rather than at
//! every call site.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// A strictly positive credit amount.
///
/// Balances themselves (which may be zero) are plain `u64` in [`crate::model`];
/// `Credits` is specifically the type of an `amount_credits` on a request or a
/// journal entry, which must be `> 0` in every component that takes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Credits(u64);

/// Error returned when an amount fails the positivity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("amount_credits must be a positive integer")]
pub struct AmountMustBePositive;

impl Credits {
    /// Constructs a [`Credits`] value, rejecting zero.
    pub fn new(amount: u64) -> Result<Self, AmountMustBePositive> {
        if amount == 0 {
            Err(AmountMustBePositive)
        } else {
            Ok(Self(amount))
        }
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Credits {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u64::deserialize(deserializer)?;
        Credits::new(raw).map_err(serde::de::Error::custom)
    }
}

impl Display for Credits {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Credits {
    type Error = AmountMustBePositive;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value <= 0 {
            Err(AmountMustBePositive)
        } else {
            Credits::new(value as u64)
        }
    }
}

impl From<Credits> for i64 {
    /// Infallible: `Credits` is always small enough to fit, in practice, and the
    /// database column is `BIGINT`. A `u64` that genuinely overflows `i64::MAX`
    /// would itself be a configuration error far beyond what this gateway issues.
    fn from(value: Credits) -> Self {
        value.0 as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero() {
        assert!(Credits::new(0).is_err());
    }

    #[test]
    fn accepts_positive() {
        assert_eq!(Credits::new(5).unwrap().get(), 5);
    }

    #[test]
    fn deserializes_from_json_number() {
        let credits: Credits = serde_json::from_str("42").unwrap();
        assert_eq!(credits.get(), 42);
    }

    #[test]
    fn rejects_negative_json_number() {
        assert!(serde_json::from_str::<Credits>("-1").is_err());
    }

    #[test]
    fn rejects_zero_json_number() {
        assert!(serde_json::from_str::<Credits>("0").is_err());
    }
}
