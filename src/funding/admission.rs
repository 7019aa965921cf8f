use crate::core::currency::CurrencyCode;
use crate::core::ids::{AccountId, PoolId, PoolRef};
use crate::core::investment::Investment;
use crate::core::pool::{FundingPool, PoolStatus};
use crate::core::tranche::Tranche;
use crate::error::{FundingError, Result};
use crate::funding::context::Context;
use crate::funding::ledger::{Commitment, InvestmentLedger};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

/// Principal plus simple interest accrued over `days` (floored at zero),
/// rounded to the currency's minor unit.
///
/// ```
/// use rust_decimal_macros::dec;
/// use tranche_pool::core::currency::CurrencyCode;
/// use tranche_pool::funding::admission::expected_return;
///
/// let idr = CurrencyCode::new("IDR");
/// assert_eq!(expected_return(dec!(800000), dec!(10), 30, &idr).unwrap(), dec!(806575.34));
/// ```
///
/// Fails with `AmountMismatch` if the result does not fit in a `Decimal`.
pub fn expected_return(
    amount: Decimal,
    annual_rate: Decimal,
    days: i64,
    currency: &CurrencyCode,
) -> Result<Decimal> {
    let days = Decimal::from(days.max(0));
    amount
        .checked_mul(annual_rate)
        .and_then(|v| v.checked_mul(days))
        .and_then(|v| amount.checked_add(v / Decimal::from(36_500)))
        .map(|total| currency.round(total))
        .ok_or_else(|| FundingError::amount(amount, "expected return is out of range"))
}

/// Whole days until `maturity`, rounded up and floored at zero. Pools
/// without a maturity date use `default_days`.
pub fn tenor_days(maturity: Option<DateTime<Utc>>, now: DateTime<Utc>, default_days: u32) -> i64 {
    match maturity {
        Some(maturity) => {
            let seconds = (maturity - now).num_seconds();
            if seconds <= 0 {
                0
            } else {
                (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
            }
        }
        None => i64::from(default_days),
    }
}

/// The three risk acknowledgements a Catalyst investor must give.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalystConsents {
    /// Funds are the first to absorb a default.
    pub first_loss: bool,
    /// The investor accepts possible loss of principal.
    pub risk_of_loss: bool,
    /// The product is not a bank deposit.
    pub not_bank_product: bool,
}

impl CatalystConsents {
    pub fn all_accepted() -> Self {
        Self {
            first_loss: true,
            risk_of_loss: true,
            not_bank_product: true,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.first_loss {
            missing.push("first-loss consent");
        }
        if !self.risk_of_loss {
            missing.push("risk-of-loss consent");
        }
        if !self.not_bank_product {
            missing.push("not-a-bank-product consent");
        }
        missing
    }
}

/// An investor's request to commit capital, as received by the request
/// layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestRequest {
    pub pool_id: PoolId,
    pub investor_id: AccountId,
    pub tranche: Tranche,
    pub amount: Decimal,
    pub terms_accepted: bool,
    #[serde(default)]
    pub catalyst_consents: Option<CatalystConsents>,
}

impl InvestRequest {
    pub fn new(pool_id: PoolId, investor_id: AccountId, tranche: Tranche, amount: Decimal) -> Self {
        Self {
            pool_id,
            investor_id,
            tranche,
            amount,
            terms_accepted: false,
            catalyst_consents: None,
        }
    }

    /// Accept the terms and, for Catalyst, every risk consent.
    pub fn with_all_consents(mut self) -> Self {
        self.terms_accepted = true;
        if self.tranche == Tranche::Catalyst {
            self.catalyst_consents = Some(CatalystConsents::all_accepted());
        }
        self
    }

    fn check_consents(&self) -> Result<()> {
        if !self.terms_accepted {
            return Err(FundingError::ConsentRequired {
                tranche: self.tranche,
                missing: "terms and conditions".to_string(),
            });
        }
        if self.tranche == Tranche::Catalyst {
            let missing = self.catalyst_consents.unwrap_or_default().missing();
            if !missing.is_empty() {
                return Err(FundingError::ConsentRequired {
                    tranche: self.tranche,
                    missing: missing.join(", "),
                });
            }
        }
        Ok(())
    }
}

/// Projected outcome of investing `amount` into a tranche right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentQuote {
    pub pool_id: PoolId,
    pub tranche: Tranche,
    pub currency: CurrencyCode,
    pub amount: Decimal,
    pub interest_rate: Decimal,
    pub days_to_maturity: i64,
    pub interest: Decimal,
    pub expected_return: Decimal,
    /// Remaining capacity of the tranche.
    pub max_investable: Decimal,
    pub can_invest: bool,
}

pub struct Admission {
    ctx: Context,
    ledger: InvestmentLedger,
}

impl Admission {
    pub(crate) fn new(ctx: Context) -> Self {
        let ledger = InvestmentLedger::new(ctx.clone());
        Self { ctx, ledger }
    }

    /// Admit `amount` into `tranche` of an open pool.
    ///
    /// On success the investment, the pool counters and (if the pool is
    /// now fully funded) the Filled transition are committed together.
    pub fn admit(
        &self,
        pool_id: PoolId,
        investor_id: AccountId,
        tranche: Tranche,
        amount: Decimal,
        interest_rate: Decimal,
        days_to_maturity: i64,
    ) -> Result<Investment> {
        let result = self.ctx.transact(pool_id, "admit", |txn| {
            let pool = txn.pool();
            if pool.status() != PoolStatus::Open {
                return Err(FundingError::PoolNotOpen {
                    pool: pool_id,
                    status: pool.status(),
                });
            }
            check_amount(pool, amount)?;
            let remaining = pool.tranche(tranche).remaining();
            if amount > remaining {
                return Err(FundingError::ExceedsCapacity {
                    tranche,
                    requested: amount,
                    remaining,
                });
            }

            let days = u32::try_from(days_to_maturity.max(0)).map_err(|_| {
                FundingError::input("days_to_maturity", format!("{days_to_maturity} is too long"))
            })?;
            let commitment = Commitment {
                investor_id,
                tranche,
                amount,
                expected_return: expected_return(
                    amount,
                    interest_rate,
                    i64::from(days),
                    pool.currency(),
                )?,
                interest_rate,
                days_to_maturity: days,
            };
            let investment = self.ledger.record(txn, commitment)?;

            let now = txn.now();
            txn.pool_mut().add_funding(tranche, amount, now);
            if txn.pool().is_fully_funded() && txn.pool_mut().advance(PoolStatus::Filled, now) {
                info!("pool {pool_id} filled at {}", txn.pool().funded_amount());
            }
            Ok(investment)
        });

        match &result {
            Ok(inv) => info!(
                "admitted {amount} into {tranche} tranche of pool {pool_id} (investment {})",
                inv.id()
            ),
            Err(e) => warn!("admission of {amount} into pool {pool_id} rejected: {e}"),
        }
        result
    }

    /// Request-layer entry point: checks consents, then admits at the
    /// tranche's rate for the pool's remaining tenor.
    pub fn invest(&self, request: &InvestRequest) -> Result<Investment> {
        request.check_consents()?;
        let snapshot = self.ctx.store.load(request.pool_id)?;
        let pool = &snapshot.pool;
        let rate = pool.tranche(request.tranche).interest_rate;
        let days = tenor_days(
            pool.maturity_date(),
            Utc::now(),
            self.ctx.config.default_tenor_days,
        );
        self.admit(
            request.pool_id,
            request.investor_id,
            request.tranche,
            request.amount,
            rate,
            days,
        )
    }

    /// Projected return of investing `amount` without committing anything.
    pub fn quote(
        &self,
        pool: impl Into<PoolRef>,
        tranche: Tranche,
        amount: Decimal,
    ) -> Result<InvestmentQuote> {
        let snapshot = self.ctx.load(pool.into())?;
        let pool = &snapshot.pool;
        let book = pool.tranche(tranche);
        let days = tenor_days(
            pool.maturity_date(),
            Utc::now(),
            self.ctx.config.default_tenor_days,
        );
        let expected = expected_return(amount, book.interest_rate, days, pool.currency())?;
        let max_investable = book.remaining();
        Ok(InvestmentQuote {
            pool_id: pool.id(),
            tranche,
            currency: pool.currency().clone(),
            amount,
            interest_rate: book.interest_rate,
            days_to_maturity: days,
            interest: expected - amount,
            expected_return: expected,
            max_investable,
            can_invest: pool.status() == PoolStatus::Open
                && check_amount(pool, amount).is_ok()
                && amount <= max_investable,
        })
    }
}

fn check_amount(pool: &FundingPool, amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(FundingError::amount(amount, "investment must be positive"));
    }
    if !pool.currency().is_representable(amount) {
        return Err(FundingError::amount(
            amount,
            format!("more precise than {} allows", pool.currency()),
        ));
    }
    Ok(())
}
