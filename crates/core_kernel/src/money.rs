//! Integer-cent arithmetic with exact decimal rounding
//!
//! All persisted monetary values in the billing engine are whole minor units
//! (`i64` cents). Anything that can produce a fraction of a cent (fractional
//! quantities, percentage rates) is computed in `rust_decimal::Decimal` and
//! brought back to cents with [`round_half_up`]. Binary floating point never
//! touches a monetary value.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// An amount in minor currency units
pub type Cents = i64;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CHF,
    INR,
    AUD,
    CAD,
    SGD,
    HKD,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Returns the currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::JPY => "¥",
            Currency::CHF => "CHF",
            Currency::INR => "₹",
            Currency::AUD => "A$",
            Currency::CAD => "C$",
            Currency::SGD => "S$",
            Currency::HKD => "HK$",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CHF => "CHF",
            Currency::INR => "INR",
            Currency::AUD => "AUD",
            Currency::CAD => "CAD",
            Currency::SGD => "SGD",
            Currency::HKD => "HKD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "JPY" => Ok(Currency::JPY),
            "CHF" => Ok(Currency::CHF),
            "INR" => Ok(Currency::INR),
            "AUD" => Ok(Currency::AUD),
            "CAD" => Ok(Currency::CAD),
            "SGD" => Ok(Currency::SGD),
            "HKD" => Ok(Currency::HKD),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Rounds a decimal amount of cents to a whole cent, ties away from zero
///
/// For the non-negative amounts that flow through invoice computation this is
/// classic half-up rounding (`0.5 -> 1`, `2.5 -> 3`). Values outside the `i64`
/// range saturate.
pub fn round_half_up(value: Decimal) -> Cents {
    let rounded = value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded.to_i64().unwrap_or(if rounded.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Computes `round(base × percent / 100)` in cents
///
/// `percent` is expressed in percentage points (`7` means 7%, `33.33` means
/// 33.33%).
pub fn percent_of(base: Cents, percent: Decimal) -> Cents {
    let product = Decimal::from(base)
        .checked_mul(percent)
        .unwrap_or(Decimal::MAX);
    round_half_up(product / dec!(100))
}

/// Clamps an amount into `[0, max]`; a negative `max` is treated as zero
pub fn clamp_cents(value: Cents, max: Cents) -> Cents {
    value.clamp(0, max.max(0))
}

/// Renders cents for human-facing text, e.g. `$1,234.50`
pub fn format_cents(cents: Cents, currency: Currency) -> String {
    let dp = currency.decimal_places();
    let negative = cents < 0;
    let magnitude = cents.unsigned_abs();
    let divisor = 10u64.pow(dp);
    let whole = magnitude / divisor;
    let fraction = magnitude % divisor;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    if dp == 0 {
        format!("{}{}{}", sign, currency.symbol(), grouped)
    } else {
        format!(
            "{}{}{}.{:0width$}",
            sign,
            currency.symbol(),
            grouped,
            fraction,
            width = dp as usize
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_up_ties() {
        assert_eq!(round_half_up(dec!(0.5)), 1);
        assert_eq!(round_half_up(dec!(2.5)), 3);
        assert_eq!(round_half_up(dec!(2.4999)), 2);
        assert_eq!(round_half_up(dec!(0.3333)), 0);
    }

    #[test]
    fn test_percent_of_seven_percent() {
        assert_eq!(percent_of(1000, dec!(7)), 70);
    }

    #[test]
    fn test_clamp_cents() {
        assert_eq!(clamp_cents(5000, 1000), 1000);
        assert_eq!(clamp_cents(-5, 1000), 0);
        assert_eq!(clamp_cents(10, -3), 0);
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(123450, Currency::USD), "$1,234.50");
        assert_eq!(format_cents(5, Currency::EUR), "€0.05");
        assert_eq!(format_cents(10000, Currency::JPY), "¥10,000");
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!("usd".parse::<Currency>(), Ok(Currency::USD));
        assert!(matches!("XXX".parse::<Currency>(), Err(MoneyError::UnknownCurrency(_))));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn percent_of_never_exceeds_base_for_rates_up_to_hundred(
            base in 0i64..1_000_000_000i64,
            basis_points in 0u32..=10_000u32
        ) {
            let percent = Decimal::new(basis_points as i64, 2);
            let result = percent_of(base, percent);
            prop_assert!(result >= 0);
            prop_assert!(result <= base);
        }

        #[test]
        fn clamp_stays_in_range(value in any::<i64>(), max in 0i64..i64::MAX) {
            let clamped = clamp_cents(value, max);
            prop_assert!(clamped >= 0 && clamped <= max);
        }
    }
}
