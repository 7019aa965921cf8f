use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Risk class within a funding pool.
///
/// Declaration order is the waterfall order: `Priority` sorts before
/// `Catalyst`, and every match on this type is exhaustive so a third
/// class cannot be added without revisiting settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tranche {
    /// Senior: lower rate, paid first.
    Priority,
    /// Junior: higher rate, absorbs first loss.
    Catalyst,
}

impl Tranche {
    pub const ALL: [Tranche; 2] = [Tranche::Priority, Tranche::Catalyst];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tranche::Priority => "priority",
            Tranche::Catalyst => "catalyst",
        }
    }
}

impl fmt::Display for Tranche {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Tranche {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "priority" | "senior" => Ok(Tranche::Priority),
            "catalyst" | "junior" => Ok(Tranche::Catalyst),
            other => Err(format!("unknown tranche '{other}', expected priority or catalyst")),
        }
    }
}

/// Capacity and pricing of one tranche of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrancheBook {
    /// Capital this tranche may absorb.
    pub target: Decimal,
    /// Capital committed so far.
    pub funded: Decimal,
    /// Interest rate in percent per annum.
    pub interest_rate: Decimal,
}

impl TrancheBook {
    pub fn new(target: Decimal, interest_rate: Decimal) -> Self {
        Self {
            target,
            funded: Decimal::ZERO,
            interest_rate,
        }
    }

    /// Headroom left in this tranche. Never negative.
    pub fn remaining(&self) -> Decimal {
        (self.target - self.funded).max(Decimal::ZERO)
    }

    pub fn is_full(&self) -> bool {
        self.funded >= self.target
    }

    /// Funded share of the target, in percent.
    pub fn percentage_funded(&self) -> f64 {
        percentage(self.funded, self.target)
    }
}

pub(crate) fn percentage(part: Decimal, whole: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;

    if whole == Decimal::ZERO {
        return 0.0;
    }
    (part / whole * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_waterfall_order() {
        assert!(Tranche::Priority < Tranche::Catalyst);
        assert_eq!(Tranche::ALL[0], Tranche::Priority);
    }

    #[test]
    fn test_parse_tranche() {
        assert_eq!("Priority".parse::<Tranche>().unwrap(), Tranche::Priority);
        assert_eq!("junior".parse::<Tranche>().unwrap(), Tranche::Catalyst);
        assert!("mezzanine".parse::<Tranche>().is_err());
    }

    #[test]
    fn test_tranche_serde_snake_case() {
        let json = serde_json::to_string(&Tranche::Catalyst).unwrap();
        assert_eq!(json, "\"catalyst\"");
    }

    #[test]
    fn test_book_remaining() {
        let mut book = TrancheBook::new(dec!(800), dec!(10));
        book.funded = dec!(300);
        assert_eq!(book.remaining(), dec!(500));
        assert!(!book.is_full());
        book.funded = dec!(800);
        assert!(book.is_full());
        assert_eq!(book.remaining(), Decimal::ZERO);
    }

    #[test]
    fn test_book_percentage() {
        let mut book = TrancheBook::new(dec!(200), dec!(15));
        book.funded = dec!(50);
        assert!((book.percentage_funded() - 25.0).abs() < 1e-9);
        assert_eq!(TrancheBook::new(Decimal::ZERO, dec!(1)).percentage_funded(), 0.0);
    }
}
