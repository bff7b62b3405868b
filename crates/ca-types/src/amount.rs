use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fractional digits carried by the course token.
pub const DECIMALS: u32 = 8;

const UNIT: u64 = 10_u64.pow(DECIMALS);

/// Non-negative token quantity, stored as a count of base units.
///
/// `Amount` cannot go below zero: subtraction is only exposed through
/// [`Amount::checked_sub`], so a balance that would underflow is rejected
/// instead of clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("amount is empty")]
    Empty,
    #[error("amount cannot be negative")]
    Negative,
    #[error("amount has more than {DECIMALS} decimal places")]
    TooPrecise,
    #[error("amount is too large")]
    Overflow,
    #[error("invalid amount: {0}")]
    Invalid(String),
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    /// Whole tokens, e.g. `Amount::from_tokens(40)` is `40.00`.
    pub fn from_tokens(tokens: u64) -> Self {
        Self(tokens.saturating_mul(UNIT))
    }

    pub const fn base_units(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Two-decimal display with a currency symbol, rounded half up: `12.50 ICP`.
    pub fn format_crypto(self, symbol: &str) -> String {
        let per_cent = u128::from(UNIT / 100);
        let cents = (u128::from(self.0) + per_cent / 2) / per_cent;
        let formatted = format!("{}.{:02}", cents / 100, cents % 100);
        if symbol.is_empty() {
            formatted
        } else {
            format!("{formatted} {symbol}")
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNIT;
        let frac = self.0 % UNIT;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:0width$}", width = DECIMALS as usize);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AmountParseError::Empty);
        }
        if trimmed.starts_with('-') {
            return Err(AmountParseError::Negative);
        }

        let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let (whole, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        let is_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
            return Err(AmountParseError::Invalid(trimmed.to_owned()));
        }
        if frac.len() > DECIMALS as usize {
            return Err(AmountParseError::TooPrecise);
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountParseError::Overflow)?
        };
        let frac_units: u64 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<width$}", width = DECIMALS as usize)
                .parse()
                .map_err(|_| AmountParseError::Invalid(trimmed.to_owned()))?
        };

        whole
            .checked_mul(UNIT)
            .and_then(|units| units.checked_add(frac_units))
            .map(Amount)
            .ok_or(AmountParseError::Overflow)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// Accepts `"12.5"`, `12` and `12.5` so HTTP clients can send either form.
#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Text(String),
    Whole(u64),
    Fractional(f64),
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parsed = match AmountRepr::deserialize(deserializer)? {
            AmountRepr::Text(text) => text.parse(),
            AmountRepr::Whole(tokens) => Amount::from_str(&tokens.to_string()),
            AmountRepr::Fractional(value) if value < 0.0 => Err(AmountParseError::Negative),
            AmountRepr::Fractional(value) => value.to_string().parse(),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_tokens() {
        assert_eq!("40".parse::<Amount>(), Ok(Amount::from_tokens(40)));
        assert_eq!(
            "12.5".parse::<Amount>(),
            Ok(Amount::from_base_units(1_250_000_000))
        );
        assert_eq!(".5".parse::<Amount>(), Ok(Amount::from_base_units(50_000_000)));
        assert_eq!("0.00000001".parse::<Amount>(), Ok(Amount::from_base_units(1)));
    }

    #[test]
    fn rejects_negative_and_malformed_input() {
        assert_eq!("-1".parse::<Amount>(), Err(AmountParseError::Negative));
        assert_eq!("  ".parse::<Amount>(), Err(AmountParseError::Empty));
        assert_eq!("0.000000001".parse::<Amount>(), Err(AmountParseError::TooPrecise));
        assert!(matches!("1.2.3".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert!(matches!("abc".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert_eq!(
            "184467440738".parse::<Amount>(),
            Err(AmountParseError::Overflow)
        );
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(Amount::from_tokens(60).to_string(), "60");
        assert_eq!(Amount::from_base_units(1_250_000_000).to_string(), "12.5");
        assert_eq!(Amount::from_base_units(1).to_string(), "0.00000001");
    }

    #[test]
    fn format_crypto_rounds_to_two_places() {
        assert_eq!(Amount::from_tokens(25).format_crypto("ICP"), "25.00 ICP");
        assert_eq!(Amount::from_base_units(1_255_000_000).format_crypto("ICP"), "12.55 ICP");
        assert_eq!(Amount::from_base_units(1_254_900_000).format_crypto(""), "12.55");
        assert_eq!(Amount::from_base_units(1_254_000_000).format_crypto(""), "12.54");
    }

    #[test]
    fn checked_sub_refuses_to_underflow() {
        let ten = Amount::from_tokens(10);
        let forty = Amount::from_tokens(40);
        assert_eq!(ten.checked_sub(forty), None);
        assert_eq!(forty.checked_sub(ten), Some(Amount::from_tokens(30)));
    }

    #[test]
    fn deserializes_strings_and_numbers() {
        let from_text: Amount = serde_json::from_str("\"40.25\"").unwrap();
        let from_int: Amount = serde_json::from_str("40").unwrap();
        let from_float: Amount = serde_json::from_str("40.25").unwrap();
        assert_eq!(from_text, from_float);
        assert_eq!(from_int, Amount::from_tokens(40));
        assert!(serde_json::from_str::<Amount>("-3").is_err());
        assert_eq!(serde_json::to_string(&from_text).unwrap(), "\"40.25\"");
    }
}
