use crate::core::ids::{AccountId, InvestmentId, PoolRef};
use crate::core::investment::{Investment, InvestmentStatus, NewInvestment};
use crate::core::pool::PoolStatus;
use crate::core::tranche::Tranche;
use crate::core::transaction::{TransactionKind, TransactionRecord};
use crate::error::{FundingError, Result};
use crate::funding::context::{Context, PoolTxn};
use log::info;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Commitment terms handed to [`InvestmentLedger::record`].
#[derive(Debug, Clone)]
pub(crate) struct Commitment {
    pub investor_id: AccountId,
    pub tranche: Tranche,
    pub amount: Decimal,
    pub expected_return: Decimal,
    pub interest_rate: Decimal,
    pub days_to_maturity: u32,
}

/// Aggregated view of one investor's positions across all pools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    /// Principal of active investments.
    pub total_funding: Decimal,
    /// Interest still expected on active investments.
    pub total_expected_gain: Decimal,
    /// Profit or loss realized on settled investments. May be negative.
    pub total_realized_gain: Decimal,
    pub priority_allocation: Decimal,
    pub catalyst_allocation: Decimal,
    pub active_investments: usize,
    pub completed_deals: usize,
}

impl PortfolioSummary {
    pub fn from_investments<'a>(investments: impl IntoIterator<Item = &'a Investment>) -> Self {
        let mut summary = PortfolioSummary::default();
        for inv in investments {
            if inv.status().is_settled() {
                summary.completed_deals += 1;
                summary.total_realized_gain += inv.realized_gain().unwrap_or_default();
                continue;
            }
            summary.active_investments += 1;
            summary.total_funding += inv.amount();
            summary.total_expected_gain += inv.expected_gain();
            match inv.tranche() {
                Tranche::Priority => summary.priority_allocation += inv.amount(),
                Tranche::Catalyst => summary.catalyst_allocation += inv.amount(),
            }
        }
        summary
    }
}

pub struct InvestmentLedger {
    ctx: Context,
}

impl InvestmentLedger {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Stage a new active investment on `txn`.
    ///
    /// Only the shape is checked here; capacity and pool status belong to
    /// admission.
    pub(crate) fn record(&self, txn: &mut PoolTxn, commitment: Commitment) -> Result<Investment> {
        if commitment.amount <= Decimal::ZERO {
            return Err(FundingError::amount(commitment.amount, "principal must be positive"));
        }
        if commitment.expected_return < commitment.amount {
            return Err(FundingError::amount(
                commitment.expected_return,
                "expected return is below principal",
            ));
        }

        let pool_id = txn.pool().id();
        let invoice_id = txn.pool().invoice_id();
        let currency = txn.pool().currency().clone();
        let investment = Investment::from_new(NewInvestment {
            pool_id,
            investor_id: commitment.investor_id,
            tranche: commitment.tranche,
            amount: commitment.amount,
            expected_return: commitment.expected_return,
            interest_rate: commitment.interest_rate,
            days_to_maturity: commitment.days_to_maturity,
            sequence: txn.investments().len() as u64,
            invested_at: txn.now(),
        });

        txn.investments_mut().push(investment.clone());
        txn.emit(
            TransactionRecord::new(
                TransactionKind::Investment,
                invoice_id,
                Some(commitment.investor_id),
                commitment.amount,
                currency,
            )
            .with_note(format!("{} tranche", commitment.tranche)),
        );
        Ok(investment)
    }

    /// Stage the settlement of one investment on `txn`.
    pub(crate) fn mark_settled_in(
        &self,
        txn: &mut PoolTxn,
        investment_id: InvestmentId,
        status: InvestmentStatus,
        actual_return: Decimal,
        reference: Option<String>,
    ) -> Result<Investment> {
        if !status.is_settled() {
            return Err(FundingError::input("status", "target status must be repaid or defaulted"));
        }
        if actual_return < Decimal::ZERO {
            return Err(FundingError::amount(actual_return, "actual return must not be negative"));
        }

        let now = txn.now();
        let investment = txn
            .investments_mut()
            .iter_mut()
            .find(|inv| inv.id() == investment_id)
            .ok_or(FundingError::InvestmentNotFound(investment_id))?;
        if investment.status().is_settled() {
            return Err(FundingError::InvestmentAlreadySettled {
                id: investment_id,
                status: investment.status(),
            });
        }
        investment.settle(status, actual_return, now, reference);
        Ok(investment.clone())
    }

    /// Settle a single investment in its own transaction.
    ///
    /// The pool must have finished funding (Filled or Disbursed).
    pub fn mark_settled(
        &self,
        investment_id: InvestmentId,
        status: InvestmentStatus,
        actual_return: Decimal,
    ) -> Result<Investment> {
        let pool_id = self.ctx.store.pool_for_investment(investment_id)?;
        let settled = self.ctx.transact(pool_id, "settle investment", |txn| {
            let pool = txn.pool();
            if !matches!(pool.status(), PoolStatus::Filled | PoolStatus::Disbursed) {
                return Err(FundingError::InvalidState {
                    pool: pool.id(),
                    status: pool.status(),
                    operation: "settle an investment of",
                });
            }
            let settled = self.mark_settled_in(txn, investment_id, status, actual_return, None)?;
            if actual_return > Decimal::ZERO {
                let record = TransactionRecord::new(
                    TransactionKind::InvestorReturn,
                    txn.pool().invoice_id(),
                    Some(settled.investor_id()),
                    actual_return,
                    txn.pool().currency().clone(),
                );
                txn.emit(record);
            }
            Ok(settled)
        })?;
        info!("investment {investment_id} settled as {status} with {actual_return}");
        Ok(settled)
    }

    /// Investments of a pool in ledger order: Priority before Catalyst,
    /// each by commitment time.
    pub fn list_by_pool(&self, pool: impl Into<PoolRef>) -> Result<Vec<Investment>> {
        Ok(self.ctx.load(pool.into())?.investments)
    }

    pub fn investment(&self, investment_id: InvestmentId) -> Result<Investment> {
        let pool_id = self.ctx.store.pool_for_investment(investment_id)?;
        self.ctx
            .store
            .load(pool_id)?
            .investments
            .into_iter()
            .find(|inv| inv.id() == investment_id)
            .ok_or(FundingError::InvestmentNotFound(investment_id))
    }

    /// All investments of an investor, oldest first.
    pub fn by_investor(&self, investor_id: AccountId) -> Result<Vec<Investment>> {
        Ok(self.ctx.store.investments_by_investor(investor_id)?)
    }

    pub fn portfolio_summary(&self, investor_id: AccountId) -> Result<PortfolioSummary> {
        let investments = self.by_investor(investor_id)?;
        Ok(PortfolioSummary::from_investments(&investments))
    }
}
