//! Token amounts
//!
//! Payouts, fees and contributions are 256-bit unsigned integers on chain and
//! overflow `f64` precision long before they overflow `U256`. `Amount` wraps
//! `alloy_primitives::U256` and always crosses the JSON boundary as a decimal
//! string.

use alloy_primitives::utils::{parse_units, ParseUnits, Unit};
use alloy_primitives::U256;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Unsigned token amount in base units (wei-style)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub U256);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountParseError(pub String);

impl fmt::Display for AmountParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid amount: {}", self.0)
    }
}

impl std::error::Error for AmountParseError {}

/// Decimals past `Unit::MAX` (77) clamp to it
fn unit(decimals: u8) -> Unit {
    Unit::new(decimals).unwrap_or(Unit::MAX)
}

impl Amount {
    pub const ZERO: Amount = Amount(U256::ZERO);

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Sum of two amounts, pinned at `U256::MAX`
    ///
    /// Sums of one token's amounts are bounded by its supply, so saturation
    /// only triggers on corrupted input.
    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    pub fn saturating_mul_count(self, count: u64) -> Amount {
        Amount(self.0.saturating_mul(U256::from(count)))
    }

    /// Human units with every significant fractional digit, e.g. `1.5` or `2.0`
    pub fn format_units(&self, decimals: u8) -> String {
        if decimals == 0 {
            return self.0.to_string();
        }
        let full = ParseUnits::U256(self.0).format_units(unit(decimals));
        let trimmed = full.trim_end_matches('0');
        if trimmed.ends_with('.') {
            format!("{}0", trimmed)
        } else {
            trimmed.to_string()
        }
    }

    /// Human units rounded half-up to exactly `places` fractional digits
    pub fn format_fixed(&self, decimals: u8, places: u8) -> String {
        let scaled = if places >= decimals {
            self.0.saturating_mul(unit(places - decimals).wei())
        } else {
            let divisor = unit(decimals - places).wei();
            self.0.saturating_add(divisor / U256::from(2u64)) / divisor
        };
        if places == 0 {
            return scaled.to_string();
        }
        ParseUnits::U256(scaled).format_units(unit(places))
    }

    /// Parses a human-unit decimal (`"12.3456"`) back into base units
    ///
    /// Digits beyond `decimals` are truncated; negative values are rejected.
    pub fn parse_units(raw: &str, decimals: u8) -> Result<Amount, AmountParseError> {
        let raw = raw.trim();
        match parse_units(raw, decimals) {
            Ok(ParseUnits::U256(value)) => Ok(Amount(value)),
            Ok(ParseUnits::I256(_)) | Err(_) => Err(AmountParseError(raw.to_string())),
        }
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(U256::from(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    /// Accepts decimal strings and `0x`-prefixed hex (raw RPC quantities)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x") {
            Some(hex_digits) if hex_digits.is_empty() => Ok(U256::ZERO),
            Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
            None => U256::from_str_radix(s, 10),
        };
        parsed.map(Amount).map_err(|_| AmountParseError(s.to_string()))
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, Amount::saturating_add)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal string or unsigned integer amount")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Amount, E> {
        Ok(Amount::from(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Amount, E> {
        value.parse().map_err(E::custom)
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

    #[test]
    fn test_serializes_as_decimal_string() {
        let big: Amount = "123456789012345678901234567890".parse().unwrap();
        let json = serde_json::to_string(&big).unwrap();
        assert_eq!(json, "\"123456789012345678901234567890\"");

        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, big);
        let from_number: Amount = serde_json::from_str("42").unwrap();
        assert_eq!(from_number, Amount::from(42));
    }

    #[test]
    fn test_hex_quantities() {
        let amount: Amount = "0xff".parse().unwrap();
        assert_eq!(amount, Amount::from(255));
        assert!("0xzz".parse::<Amount>().is_err());
        assert!("-5".parse::<Amount>().is_err());
    }

    #[test]
    fn test_format_units() {
        let one_and_half = Amount::from(1_500_000_000_000_000_000);
        assert_eq!(one_and_half.format_units(18), "1.5");
        assert_eq!(Amount::from(2_000_000_000_000_000_000).format_units(18), "2.0");
        assert_eq!(Amount::from(1).format_units(18), "0.000000000000000001");
        assert_eq!(Amount::from(7).format_units(0), "7");
    }

    #[test]
    fn test_format_fixed_rounds_half_up() {
        // 1.23455 POOL -> 1.2346
        let amount = Amount::from(1_234_550_000_000_000_000);
        assert_eq!(amount.format_fixed(18, 4), "1.2346");
        // 0.00004 POOL -> 0.0000
        assert_eq!(Amount::from(40_000_000_000_000).format_fixed(18, 4), "0.0000");
        assert_eq!(Amount::from(3).format_fixed(0, 2), "3.00");
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(Amount::parse_units("12.3456", 4).unwrap(), Amount::from(123_456));
        assert_eq!(Amount::parse_units("1", 4).unwrap(), Amount::from(10_000));
        assert_eq!(Amount::parse_units("0.123456", 4).unwrap(), Amount::from(1_234));
        assert!(Amount::parse_units("abc", 4).is_err());
        assert!(Amount::parse_units("-1", 4).is_err());
    }

    #[test]
    fn test_sum_and_saturation() {
        let total: Amount = vec![Amount::from(1), Amount::from(2), Amount::from(3)].into_iter().sum();
        assert_eq!(total, Amount::from(6));

        let max = Amount(U256::MAX);
        assert_eq!(max.saturating_add(Amount::from(1)), max);
    }
}
