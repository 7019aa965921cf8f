//! Pool lifecycle: creation, disbursement, closing and the read side.
//!
//! ```text
//! Open --(funded >= target)--> Filled --(disburse)--> Disbursed --(settle)--> Closed
//!   \______________________(close early)_____________/
//! ```

use crate::core::currency::CurrencyCode;
use crate::core::ids::{AccountId, InvestmentId, InvoiceId, PoolId, PoolRef};
use crate::core::investment::InvestmentStatus;
use crate::core::pool::{FundingPool, PoolStatus, PoolTerms};
use crate::core::tranche::Tranche;
use crate::core::transaction::{InvoiceStatus, TransactionKind, TransactionRecord};
use crate::error::{FundingError, Result};
use crate::events::PendingEvents;
use crate::funding::context::{Context, PoolTxn};
use crate::settlement::allocation::platform_fee;
use crate::store::PoolSnapshot;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One investment as shown to the exporter and the notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorBreakdown {
    pub investment_id: InvestmentId,
    pub investor_id: AccountId,
    pub tranche: Tranche,
    pub amount: Decimal,
    pub interest_rate: Decimal,
    pub expected_return: Decimal,
    pub interest: Decimal,
    pub status: InvestmentStatus,
}

/// Per-investor view of a pool, in ledger order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolBreakdown {
    pub pool_id: PoolId,
    pub invoice_id: InvoiceId,
    pub currency: CurrencyCode,
    pub investors: Vec<InvestorBreakdown>,
}

impl PoolBreakdown {
    fn from_snapshot(snapshot: &PoolSnapshot) -> Self {
        let investors = snapshot
            .investments
            .iter()
            .map(|inv| InvestorBreakdown {
                investment_id: inv.id(),
                investor_id: inv.investor_id(),
                tranche: inv.tranche(),
                amount: inv.amount(),
                interest_rate: inv.interest_rate(),
                expected_return: inv.expected_return(),
                interest: inv.expected_gain(),
                status: inv.status(),
            })
            .collect();
        Self {
            pool_id: snapshot.pool.id(),
            invoice_id: snapshot.pool.invoice_id(),
            currency: snapshot.pool.currency().clone(),
            investors,
        }
    }

    pub fn total_principal(&self) -> Decimal {
        self.investors.iter().map(|row| row.amount).sum()
    }

    pub fn total_interest(&self) -> Decimal {
        self.investors.iter().map(|row| row.interest).sum()
    }
}

/// What the exporter owes investors after an early close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentNotice {
    pub pool_id: PoolId,
    pub invoice_id: InvoiceId,
    pub owner: Option<AccountId>,
    pub currency: CurrencyCode,
    pub principal: Decimal,
    pub total_interest: Decimal,
    pub total_due: Decimal,
    /// Amount advanced to the exporter (principal less platform fee).
    pub advance_amount: Decimal,
    pub platform_fee: Decimal,
    pub maturity_date: Option<DateTime<Utc>>,
    pub investors: Vec<InvestorBreakdown>,
}

pub struct PoolLifecycle {
    ctx: Context,
}

impl PoolLifecycle {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Open a pool for an invoice.
    ///
    /// The priority target is rounded to the minor unit and the catalyst
    /// target takes the rest, so the two always sum to the target.
    pub fn create_pool(&self, terms: PoolTerms) -> Result<FundingPool> {
        let config = &self.ctx.config;
        let currency = &terms.currency;
        if terms.target_amount <= Decimal::ZERO {
            return Err(FundingError::amount(terms.target_amount, "target must be positive"));
        }
        if !currency.is_representable(terms.target_amount) {
            return Err(FundingError::amount(
                terms.target_amount,
                format!("more precise than {currency} allows"),
            ));
        }
        let ratio_sum = terms.priority_ratio + terms.catalyst_ratio;
        if terms.priority_ratio < Decimal::ZERO
            || terms.catalyst_ratio < Decimal::ZERO
            || (ratio_sum - Decimal::ONE).abs() > config.ratio_tolerance
        {
            return Err(FundingError::InvalidRatio {
                priority: terms.priority_ratio,
                catalyst: terms.catalyst_ratio,
            });
        }
        if terms.priority_rate < Decimal::ZERO || terms.catalyst_rate < Decimal::ZERO {
            return Err(FundingError::input("interest rate", "must not be negative"));
        }

        let now = Utc::now();
        let priority_target = currency
            .round(terms.target_amount * terms.priority_ratio)
            .min(terms.target_amount);
        let catalyst_target = terms.target_amount - priority_target;
        let deadline = terms
            .deadline
            .unwrap_or_else(|| now + Duration::days(i64::from(config.default_funding_days)));

        let pool = FundingPool::open(&terms, priority_target, catalyst_target, deadline, now);
        self.ctx.store.insert_pool(pool.clone()).inspect_err(|e| {
            warn!("pool creation for invoice {} rejected: {e}", terms.invoice_id);
        })?;

        self.ctx.publish(PendingEvents {
            transactions: Vec::new(),
            invoice_updates: vec![(pool.invoice_id(), InvoiceStatus::Funding)],
        });
        info!(
            "opened pool {} for invoice {}: {} {} ({priority_target} priority / {catalyst_target} catalyst)",
            pool.id(),
            pool.invoice_id(),
            pool.target_amount(),
            pool.currency()
        );
        Ok(pool)
    }

    /// Advance a filled pool's funds to the exporter.
    pub fn disburse(&self, pool: impl Into<PoolRef>) -> Result<FundingPool> {
        let pool_id = self.ctx.resolve(pool.into())?;
        let pool = self.ctx.transact(pool_id, "disburse", |txn| {
            let status = txn.pool().status();
            if status != PoolStatus::Filled {
                return Err(FundingError::InvalidState {
                    pool: pool_id,
                    status,
                    operation: "disburse",
                });
            }
            self.pay_advance(txn);
            Ok(txn.pool().clone())
        })?;
        info!("pool {pool_id} disbursed {} {}", pool.funded_amount(), pool.currency());
        Ok(pool)
    }

    /// Administrative close of a pool that stopped short of (or reached)
    /// its target. Funds raised so far are advanced and the exporter gets
    /// a notice of what is due at maturity.
    pub fn close_early(&self, pool: impl Into<PoolRef>) -> Result<PaymentNotice> {
        let pool_id = self.ctx.resolve(pool.into())?;
        let notice = self.ctx.transact(pool_id, "close early", |txn| {
            let pool = txn.pool();
            if !matches!(pool.status(), PoolStatus::Open | PoolStatus::Filled)
                || pool.funded_amount() <= Decimal::ZERO
            {
                return Err(FundingError::InvalidState {
                    pool: pool_id,
                    status: pool.status(),
                    operation: "close early",
                });
            }
            let (advance_amount, fee) = self.pay_advance(txn);

            let breakdown = PoolBreakdown::from_snapshot(&PoolSnapshot {
                pool: txn.pool().clone(),
                investments: txn.investments().to_vec(),
            });
            let principal = txn.pool().funded_amount();
            let total_interest = breakdown.total_interest();
            Ok(PaymentNotice {
                pool_id,
                invoice_id: breakdown.invoice_id,
                owner: txn.pool().owner(),
                currency: breakdown.currency,
                principal,
                total_interest,
                total_due: principal + total_interest,
                advance_amount,
                platform_fee: fee,
                maturity_date: txn.pool().maturity_date(),
                investors: breakdown.investors,
            })
        })?;
        info!(
            "pool {pool_id} closed early: {} {} due from the exporter",
            notice.total_due, notice.currency
        );
        Ok(notice)
    }

    /// Close a pool whose investments have all been settled.
    pub fn close(&self, pool: impl Into<PoolRef>) -> Result<FundingPool> {
        let pool_id = self.ctx.resolve(pool.into())?;
        let pool = self.ctx.transact(pool_id, "close", |txn| {
            let status = txn.pool().status();
            if status == PoolStatus::Closed {
                return Err(FundingError::AlreadyClosed(pool_id));
            }
            if let Some(open) = txn.investments().iter().find(|inv| !inv.status().is_settled()) {
                warn!("pool {pool_id} cannot close: investment {} is still active", open.id());
                return Err(FundingError::InvalidState {
                    pool: pool_id,
                    status,
                    operation: "close",
                });
            }
            let now = txn.now();
            txn.pool_mut().advance(PoolStatus::Closed, now);
            Ok(txn.pool().clone())
        })?;
        info!("pool {pool_id} closed");
        Ok(pool)
    }

    pub fn breakdown(&self, pool: impl Into<PoolRef>) -> Result<PoolBreakdown> {
        let snapshot = self.ctx.load(pool.into())?;
        Ok(PoolBreakdown::from_snapshot(&snapshot))
    }

    pub fn pool(&self, pool_id: PoolId) -> Result<FundingPool> {
        Ok(self.ctx.store.load(pool_id)?.pool)
    }

    pub fn pool_for_invoice(&self, invoice_id: InvoiceId) -> Result<FundingPool> {
        Ok(self.ctx.load(PoolRef::Invoice(invoice_id))?.pool)
    }

    /// Pools matching `status` (all if `None`), newest first.
    pub fn pools(&self, status: Option<PoolStatus>) -> Result<Vec<FundingPool>> {
        let mut pools = Vec::new();
        for pool_id in self.ctx.store.pool_ids()? {
            let pool = self.ctx.store.load(pool_id)?.pool;
            if status.map_or(true, |s| pool.status() == s) {
                pools.push(pool);
            }
        }
        pools.sort_by(|a, b| b.opened_at().cmp(&a.opened_at()));
        Ok(pools)
    }

    /// Move the pool to Disbursed and stage the advance to its owner.
    /// Returns the advance and the fee withheld from it.
    fn pay_advance(&self, txn: &mut PoolTxn) -> (Decimal, Decimal) {
        let pool = txn.pool();
        let currency = pool.currency().clone();
        let invoice_id = pool.invoice_id();
        let owner = pool.owner();
        let funded = pool.funded_amount();
        let fee = platform_fee(funded, self.ctx.config.platform_fee_percentage, &currency);
        let advance = funded - fee;

        let now = txn.now();
        txn.pool_mut().advance(PoolStatus::Disbursed, now);
        txn.emit(
            TransactionRecord::new(
                TransactionKind::AdvancePayment,
                invoice_id,
                owner,
                advance,
                currency.clone(),
            )
            .with_note("advance to exporter"),
        );
        if fee > Decimal::ZERO {
            txn.emit(
                TransactionRecord::new(TransactionKind::PlatformFee, invoice_id, None, fee, currency)
                    .with_note("disbursement fee"),
            );
        }
        txn.report_invoice(InvoiceStatus::Funded);
        (advance, fee)
    }
}
