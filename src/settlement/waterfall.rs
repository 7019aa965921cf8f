use crate::config::SurplusPolicy;
use crate::core::currency::CurrencyCode;
use crate::core::investment::Investment;
use crate::core::tranche::Tranche;
use crate::settlement::allocation::{capped_pro_rata, pro_rata};
use rust_decimal::Decimal;

/// Payouts aligned with the investments, plus the amount left after every
/// expected return was met.
#[derive(Debug, Clone, PartialEq)]
pub struct Waterfall {
    pub payouts: Vec<Decimal>,
    pub surplus: Decimal,
}

fn indices(investments: &[Investment], tranche: Tranche) -> Vec<usize> {
    investments
        .iter()
        .enumerate()
        .filter(|(_, inv)| inv.tranche() == tranche)
        .map(|(i, _)| i)
        .collect()
}

fn column(investments: &[Investment], idx: &[usize], f: fn(&Investment) -> Decimal) -> Vec<Decimal> {
    idx.iter().map(|&i| f(&investments[i])).collect()
}

/// Run the waterfall over `net`.
///
/// If `net` covers every Priority expected return, Priority is paid in
/// full and the remainder goes to Catalyst by principal, capped at each
/// Catalyst expected return. Otherwise Catalyst receives nothing and
/// Priority shares `net` by expected return. A surplus is paid out only
/// under [`SurplusPolicy::ProRataBonus`]; it is always reported.
pub fn distribute(
    investments: &[Investment],
    net: Decimal,
    currency: &CurrencyCode,
    surplus_policy: SurplusPolicy,
) -> Waterfall {
    let priority = indices(investments, Tranche::Priority);
    let catalyst = indices(investments, Tranche::Catalyst);
    let mut payouts = vec![Decimal::ZERO; investments.len()];

    let priority_due: Decimal = priority.iter().map(|&i| investments[i].expected_return()).sum();

    if net < priority_due {
        let due = column(investments, &priority, Investment::expected_return);
        let (shares, _) = capped_pro_rata(&due, &due, net, currency);
        for (&i, share) in priority.iter().zip(shares) {
            payouts[i] = share;
        }
        return Waterfall {
            payouts,
            surplus: Decimal::ZERO,
        };
    }

    for &i in &priority {
        payouts[i] = investments[i].expected_return();
    }
    let principal = column(investments, &catalyst, Investment::amount);
    let caps = column(investments, &catalyst, Investment::expected_return);
    let (shares, surplus) = capped_pro_rata(&principal, &caps, net - priority_due, currency);
    for (&i, share) in catalyst.iter().zip(shares) {
        payouts[i] = share;
    }

    if surplus > Decimal::ZERO && surplus_policy == SurplusPolicy::ProRataBonus {
        let recipients = if catalyst.is_empty() { &priority } else { &catalyst };
        let weights = column(investments, recipients, Investment::amount);
        for (&i, bonus) in recipients.iter().zip(pro_rata(&weights, surplus, currency)) {
            payouts[i] += bonus;
        }
    }

    Waterfall { payouts, surplus }
}
