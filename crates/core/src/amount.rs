//! Non-negative monetary amount held by the ledger.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Amount in the smallest indivisible unit (e.g. wei).
///
/// Serialized as a decimal string: the full `u128` range does not fit a JSON
/// number. Integer input is still accepted when deserializing.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

impl ValueObject for Amount {}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Validate an attached payment value; only strictly positive values are accepted.
    pub fn from_payment(value: i128) -> DomainResult<Self> {
        if value <= 0 {
            return Err(DomainError::InvalidAmount(value));
        }
        Ok(Self(value as u128))
    }

    pub const fn value(self) -> u128 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

struct AmountVisitor;

impl Visitor<'_> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("a non-negative integer amount as a decimal string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        v.parse::<u128>().map(Amount).map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Ok(Amount(u128::from(v)))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
        Ok(Amount(v))
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_and_negative_payments_are_invalid() {
        assert_eq!(Amount::from_payment(0), Err(DomainError::InvalidAmount(0)));
        assert_eq!(Amount::from_payment(-5), Err(DomainError::InvalidAmount(-5)));
    }

    #[test]
    fn overflow_is_detected() {
        assert_eq!(Amount::new(u128::MAX).checked_add(Amount::new(1)), None);
    }

    #[test]
    fn serializes_beyond_u64_as_decimal_string() {
        let big = Amount::new(u128::from(u64::MAX) + 1);

        let value = serde_json::to_value(big).unwrap();
        assert_eq!(value, serde_json::json!("18446744073709551616"));
        assert_eq!(serde_json::from_value::<Amount>(value).unwrap(), big);
        assert_eq!(serde_json::from_str::<Amount>("42").unwrap(), Amount::new(42));
        assert!(serde_json::from_str::<Amount>("\"-1\"").is_err());
    }

    proptest! {
        #[test]
        fn positive_payments_keep_their_value(v in 1i128..i128::MAX) {
            prop_assert_eq!(Amount::from_payment(v).unwrap().value(), v as u128);
        }

        #[test]
        fn json_keeps_the_full_range(v in any::<u128>()) {
            let json = serde_json::to_value(Amount::new(v)).unwrap();
            prop_assert_eq!(serde_json::from_value::<Amount>(json).unwrap(), Amount::new(v));
        }
    }
}
