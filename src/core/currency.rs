use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO 4217-style currency code of a funding pool.
///
/// Every pool is denominated in exactly one currency. The code also
/// determines the minor unit (number of decimal places) to which
/// expected returns, fees and payouts are rounded.
///
/// # Examples
///
/// ```
/// use tranche_pool::core::currency::CurrencyCode;
///
/// let idr = CurrencyCode::new("IDR");
/// let jpy = CurrencyCode::new("JPY");
/// assert_eq!(idr.minor_units(), 2);
/// assert_eq!(jpy.minor_units(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of decimal places of the smallest unit (ISO 4217 exponent).
    ///
    /// Unknown codes fall back to two decimal places.
    pub fn minor_units(&self) -> u32 {
        match self.0.as_str() {
            "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF"
            | "UGX" | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
            "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
            _ => 2,
        }
    }

    /// The smallest representable amount, e.g. `0.01` for USD.
    pub fn smallest_unit(&self) -> Decimal {
        Decimal::new(1, self.minor_units())
    }

    /// Round to the minor unit, midpoint away from zero.
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.minor_units(), RoundingStrategy::MidpointAwayFromZero)
    }

    /// Truncate toward zero to the minor unit.
    pub fn floor(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.minor_units(), RoundingStrategy::ToZero)
    }

    /// Whether `amount` carries no precision beyond the minor unit.
    pub fn is_representable(&self, amount: Decimal) -> bool {
        self.floor(amount) == amount
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self::new("IDR")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_code_normalized() {
        assert_eq!(CurrencyCode::new("idr"), CurrencyCode::new("IDR"));
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(CurrencyCode::new("USD").minor_units(), 2);
        assert_eq!(CurrencyCode::new("KRW").minor_units(), 0);
        assert_eq!(CurrencyCode::new("KWD").minor_units(), 3);
        assert_eq!(CurrencyCode::new("XYZ").minor_units(), 2);
    }

    #[test]
    fn test_round_midpoint_away_from_zero() {
        let usd = CurrencyCode::new("USD");
        assert_eq!(usd.round(dec!(806575.342465)), dec!(806575.34));
        assert_eq!(usd.round(dec!(0.125)), dec!(0.13));
        assert_eq!(CurrencyCode::new("JPY").round(dec!(10.5)), dec!(11));
    }

    #[test]
    fn test_floor_truncates() {
        let usd = CurrencyCode::new("USD");
        assert_eq!(usd.floor(dec!(33.339)), dec!(33.33));
        assert_eq!(usd.smallest_unit(), dec!(0.01));
    }

    #[test]
    fn test_representable() {
        let usd = CurrencyCode::new("USD");
        assert!(usd.is_representable(dec!(100.25)));
        assert!(!usd.is_representable(dec!(100.255)));
        assert!(CurrencyCode::new("JPY").is_representable(dec!(100)));
    }
}
