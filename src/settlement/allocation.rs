use crate::core::currency::CurrencyCode;
use rust_decimal::Decimal;

/// Platform fee on `gross`, rounded to the minor unit.
pub fn platform_fee(gross: Decimal, fee_percentage: Decimal, currency: &CurrencyCode) -> Decimal {
    currency.round(gross * (fee_percentage / Decimal::ONE_HUNDRED))
}

/// `amount * weight / weight_sum`. Falls back to scaling by the ratio when
/// the exact product does not fit in a `Decimal`.
fn share_of(amount: Decimal, weight: Decimal, weight_sum: Decimal) -> Decimal {
    match amount.checked_mul(weight) {
        Some(product) => product / weight_sum,
        None => amount * (weight / weight_sum),
    }
}

/// Split `total` proportionally to `weights`.
///
/// Each share is floored to the minor unit; the residual goes to the last
/// entry. With no positive weight the whole amount lands on the last
/// entry. Returns an empty vector for empty `weights`.
pub fn pro_rata(weights: &[Decimal], total: Decimal, currency: &CurrencyCode) -> Vec<Decimal> {
    let Some(last) = weights.len().checked_sub(1) else {
        return Vec::new();
    };
    let weight_sum: Decimal = weights.iter().sum();
    let mut shares: Vec<Decimal> = if weight_sum > Decimal::ZERO {
        weights
            .iter()
            .map(|w| currency.floor(share_of(total, *w, weight_sum)))
            .collect()
    } else {
        vec![Decimal::ZERO; weights.len()]
    };
    let allocated: Decimal = shares.iter().sum();
    shares[last] += total - allocated;
    shares
}

/// Split `total` proportionally to `weights`, never paying an entry more
/// than its cap.
///
/// Water-filling: entries whose proportional share would reach their cap
/// are paid the cap, and the rest of the pot is re-split among the
/// others. Returns the shares and whatever is left once every cap binds.
pub fn capped_pro_rata(
    weights: &[Decimal],
    caps: &[Decimal],
    total: Decimal,
    currency: &CurrencyCode,
) -> (Vec<Decimal>, Decimal) {
    debug_assert_eq!(weights.len(), caps.len());
    let n = weights.len();
    let cap_sum: Decimal = caps.iter().sum();
    if total >= cap_sum {
        return (caps.to_vec(), total - cap_sum);
    }

    let mut shares = vec![Decimal::ZERO; n];
    let mut capped = vec![false; n];
    let mut pot = total;

    loop {
        let open: Vec<usize> = (0..n).filter(|&i| !capped[i]).collect();
        let open_weight: Decimal = open.iter().map(|&i| weights[i]).sum();
        if open.is_empty() || open_weight <= Decimal::ZERO {
            break;
        }

        let binding: Vec<usize> = open
            .iter()
            .copied()
            .filter(|&i| share_of(pot, weights[i], open_weight) >= caps[i])
            .collect();

        if binding.is_empty() {
            let open_weights: Vec<Decimal> = open.iter().map(|&i| weights[i]).collect();
            for (&i, share) in open.iter().zip(pro_rata(&open_weights, pot, currency)) {
                shares[i] = share;
            }
            spill_over_caps(&mut shares, caps);
            break;
        }

        for i in binding {
            capped[i] = true;
            shares[i] = caps[i];
            pot -= caps[i];
        }
    }

    let paid: Decimal = shares.iter().sum();
    (shares, total - paid)
}

/// Move any amount above a cap (left there by residual assignment) to the
/// first entries that still have headroom.
fn spill_over_caps(shares: &mut [Decimal], caps: &[Decimal]) {
    let mut overflow = Decimal::ZERO;
    for (share, cap) in shares.iter_mut().zip(caps) {
        if *share > *cap {
            overflow += *share - *cap;
            *share = *cap;
        }
    }
    for (share, cap) in shares.iter_mut().zip(caps) {
        if overflow <= Decimal::ZERO {
            break;
        }
        let room = (*cap - *share).min(overflow);
        *share += room;
        overflow -= room;
    }
}
