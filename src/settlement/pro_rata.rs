use crate::core::currency::CurrencyCode;
use crate::core::investment::Investment;
use crate::settlement::allocation;
use rust_decimal::Decimal;

/// Payout per investment, aligned with `investments`.
///
/// `Σ payout == net` exactly; the rounding residual lands on the last
/// investment in ledger order.
pub fn distribute(investments: &[Investment], net: Decimal, currency: &CurrencyCode) -> Vec<Decimal> {
    let weights: Vec<Decimal> = investments.iter().map(Investment::amount).collect();
    allocation::pro_rata(&weights, net, currency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{AccountId, PoolId};
    use crate::core::investment::NewInvestment;
    use crate::core::tranche::Tranche;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn inv(tranche: Tranche, amount: Decimal, sequence: u64) -> Investment {
        Investment::from_new(NewInvestment {
            pool_id: PoolId::new(),
            investor_id: AccountId::new(),
            tranche,
            amount,
            expected_return: amount,
            interest_rate: dec!(10),
            days_to_maturity: 30,
            sequence,
            invested_at: Utc::now(),
        })
    }

    #[test]
    fn test_shares_follow_principal() {
        let investments = vec![
            inv(Tranche::Priority, dec!(800000), 0),
            inv(Tranche::Catalyst, dec!(200000), 1),
        ];
        let payouts = distribute(&investments, dec!(1029000), &CurrencyCode::new("IDR"));
        assert_eq!(payouts, vec![dec!(823200), dec!(205800)]);
    }

    #[test]
    fn test_residual_goes_to_last() {
        let investments = vec![
            inv(Tranche::Priority, dec!(100), 0),
            inv(Tranche::Priority, dec!(100), 1),
            inv(Tranche::Catalyst, dec!(100), 2),
        ];
        let payouts = distribute(&investments, dec!(200), &CurrencyCode::new("USD"));
        assert_eq!(payouts, vec![dec!(66.66), dec!(66.66), dec!(66.68)]);
        assert_eq!(payouts.iter().sum::<Decimal>(), dec!(200));
    }
}
