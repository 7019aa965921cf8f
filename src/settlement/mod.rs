//! Settlement: turning a repayment into per-investment payouts and
//! closing the pool.
//!
//! Two policies with different semantics are both supported:
//!
//! - [`SettlementPolicy::ProRata`]: the buyer's repayment, net of the
//!   platform fee, is shared by principal. Every investment ends Repaid.
//! - [`SettlementPolicy::TranchePriority`]: Priority is paid its expected
//!   return first; Catalyst takes what is left, capped at its own expected
//!   return, and absorbs any loss.
//!
//! The computation is a pure function of the pool snapshot; it is applied
//! inside a pool transaction so a retried or failed settlement never
//! leaves partial payouts behind.

pub mod allocation;
pub mod pro_rata;
pub mod report;
pub mod waterfall;

pub use report::{Coverage, InvestorPayout, SettlementReport, Surplus};

use crate::config::SurplusPolicy;
use crate::core::ids::{AccountId, InvoiceId, PoolRef};
use crate::core::investment::InvestmentStatus;
use crate::core::pool::PoolStatus;
use crate::core::tranche::Tranche;
use crate::core::transaction::{InvoiceStatus, TransactionKind, TransactionRecord};
use crate::error::{FundingError, Result};
use crate::funding::context::{Context, PoolTxn};
use crate::funding::ledger::InvestmentLedger;
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    /// Buyer repayment path.
    ProRata,
    /// Exporter disbursement path.
    TranchePriority,
}

impl fmt::Display for SettlementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementPolicy::ProRata => f.pad("pro_rata"),
            SettlementPolicy::TranchePriority => f.pad("tranche_priority"),
        }
    }
}

impl FromStr for SettlementPolicy {
    type Err = FundingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "pro_rata" | "prorata" => Ok(SettlementPolicy::ProRata),
            "tranche_priority" | "waterfall" => Ok(SettlementPolicy::TranchePriority),
            other => Err(FundingError::input(
                "policy",
                format!("unknown settlement policy '{other}'"),
            )),
        }
    }
}

pub struct SettlementEngine {
    ctx: Context,
    ledger: InvestmentLedger,
}

impl SettlementEngine {
    pub(crate) fn new(ctx: Context) -> Self {
        let ledger = InvestmentLedger::new(ctx.clone());
        Self { ctx, ledger }
    }

    /// Settle the pool financing `invoice_id` from a buyer repayment.
    pub fn settle_pro_rata(&self, invoice_id: InvoiceId, gross_amount: Decimal) -> Result<SettlementReport> {
        self.settle(SettlementPolicy::ProRata, invoice_id, gross_amount)
    }

    /// Settle a pool from the exporter's repayment, senior tranche first.
    pub fn settle_tranche_priority(
        &self,
        pool: impl Into<PoolRef>,
        gross_amount: Decimal,
    ) -> Result<SettlementReport> {
        self.settle(SettlementPolicy::TranchePriority, pool, gross_amount)
    }

    /// Settle a pool under `policy`. Closes the pool; a second call fails
    /// with `PoolAlreadySettled` and pays nothing.
    pub fn settle(
        &self,
        policy: SettlementPolicy,
        pool: impl Into<PoolRef>,
        gross_amount: Decimal,
    ) -> Result<SettlementReport> {
        let pool_ref = pool.into();
        let result = self.ctx.resolve(pool_ref).and_then(|pool_id| {
            self.ctx.transact(pool_id, "settle", |txn| {
                check_settleable(txn, gross_amount)?;
                self.apply(txn, policy, gross_amount)
            })
        });

        match &result {
            Ok(report) => info!(
                "settled pool {} ({policy}): gross {} fee {} net {} surplus {} -> invoice {}",
                report.pool_id,
                report.gross_amount,
                report.platform_fee,
                report.net_amount,
                report.surplus_amount(),
                report.invoice_outcome
            ),
            Err(e) => warn!("settlement of {pool_ref} ({policy}) rejected: {e}"),
        }
        result
    }

    fn apply(
        &self,
        txn: &mut PoolTxn,
        policy: SettlementPolicy,
        gross_amount: Decimal,
    ) -> Result<SettlementReport> {
        let config = &self.ctx.config;
        let pool = txn.pool().clone();
        let currency = pool.currency().clone();
        let investments = txn.investments().to_vec();

        let fee = allocation::platform_fee(gross_amount, config.platform_fee_percentage, &currency);
        let net = gross_amount - fee;

        let (payouts, surplus) = match policy {
            SettlementPolicy::ProRata => (pro_rata::distribute(&investments, net, &currency), None),
            SettlementPolicy::TranchePriority => {
                let w = waterfall::distribute(&investments, net, &currency, config.surplus_policy);
                let surplus = (w.surplus > Decimal::ZERO).then(|| Surplus {
                    amount: w.surplus,
                    policy: config.surplus_policy,
                });
                (w.payouts, surplus)
            }
        };

        let settlement_id = Uuid::new_v4();
        let reference = format!("settlement:{settlement_id}");
        let mut rows = Vec::with_capacity(investments.len());
        for (inv, actual) in investments.iter().zip(payouts) {
            let status = match policy {
                SettlementPolicy::ProRata => InvestmentStatus::Repaid,
                SettlementPolicy::TranchePriority if actual >= inv.expected_return() => {
                    InvestmentStatus::Repaid
                }
                SettlementPolicy::TranchePriority => InvestmentStatus::Defaulted,
            };
            self.ledger
                .mark_settled_in(txn, inv.id(), status, actual, Some(reference.clone()))?;
            rows.push(InvestorPayout {
                investment_id: inv.id(),
                investor_id: inv.investor_id(),
                tranche: inv.tranche(),
                principal: inv.amount(),
                expected: inv.expected_return(),
                actual,
                status,
                coverage: Coverage::of(actual, inv.expected_return()),
            });
        }

        let paid = |tranche: Tranche| -> Decimal {
            rows.iter().filter(|r| r.tranche == tranche).map(|r| r.actual).sum()
        };
        let fully_paid = |tranche: Tranche| -> bool {
            rows.iter()
                .filter(|r| r.tranche == tranche)
                .all(|r| r.coverage == Coverage::Full)
        };
        let invoice_outcome = match policy {
            SettlementPolicy::ProRata => InvoiceStatus::Repaid,
            SettlementPolicy::TranchePriority
                if fully_paid(Tranche::Priority) && fully_paid(Tranche::Catalyst) =>
            {
                InvoiceStatus::Repaid
            }
            SettlementPolicy::TranchePriority => InvoiceStatus::Defaulted,
        };

        let report = SettlementReport {
            settlement_id,
            pool_id: pool.id(),
            invoice_id: pool.invoice_id(),
            policy,
            currency: currency.clone(),
            gross_amount,
            platform_fee: fee,
            net_amount: net,
            total_expected: investments.iter().map(|inv| inv.expected_return()).sum(),
            priority_distributed: paid(Tranche::Priority),
            catalyst_distributed: paid(Tranche::Catalyst),
            priority_fully_paid: fully_paid(Tranche::Priority),
            catalyst_fully_paid: fully_paid(Tranche::Catalyst),
            surplus,
            payouts: rows,
            invoice_outcome,
            settled_at: txn.now(),
        };

        stage_records(txn, &report, pool.owner());
        let now = txn.now();
        txn.pool_mut().advance(PoolStatus::Closed, now);
        txn.report_invoice(invoice_outcome);
        Ok(report)
    }
}

/// Gate a settlement request against the pool state it would commit to.
fn check_settleable(txn: &PoolTxn, gross_amount: Decimal) -> Result<()> {
    let pool = txn.pool();
    if gross_amount <= Decimal::ZERO {
        return Err(FundingError::amount(gross_amount, "repayment must be positive"));
    }
    if !pool.currency().is_representable(gross_amount) {
        return Err(FundingError::amount(
            gross_amount,
            format!("more precise than {} allows", pool.currency()),
        ));
    }
    match pool.status() {
        PoolStatus::Closed => return Err(FundingError::PoolAlreadySettled(pool.id())),
        PoolStatus::Open => {
            return Err(FundingError::InvalidState {
                pool: pool.id(),
                status: pool.status(),
                operation: "settle",
            })
        }
        PoolStatus::Filled | PoolStatus::Disbursed => {}
    }
    if txn.investments().is_empty() {
        return Err(FundingError::InvestmentSetEmpty(pool.id()));
    }
    pool.check_invariants(txn.investments())
        .map_err(|detail| FundingError::InvariantViolation {
            pool: pool.id(),
            detail,
        })
}

fn stage_records(txn: &mut PoolTxn, report: &SettlementReport, owner: Option<AccountId>) {
    let invoice_id = report.invoice_id;
    let currency = &report.currency;
    let record = |kind: TransactionKind, account: Option<AccountId>, amount: Decimal| {
        TransactionRecord::new(kind, invoice_id, account, amount, currency.clone())
    };

    if report.policy == SettlementPolicy::ProRata {
        txn.emit(record(TransactionKind::BuyerRepayment, None, report.gross_amount));
    }

    let mut fee = report.platform_fee;
    if let Some(surplus) = &report.surplus {
        match surplus.policy {
            SurplusPolicy::ReturnToExporter => txn.emit(
                record(TransactionKind::Refund, owner, surplus.amount).with_note("settlement surplus"),
            ),
            SurplusPolicy::AccrueToPlatform => fee += surplus.amount,
            SurplusPolicy::ProRataBonus => {}
        }
    }
    if fee > Decimal::ZERO {
        txn.emit(record(TransactionKind::PlatformFee, None, fee).with_note("settlement fee"));
    }

    for payout in report.payouts.iter().filter(|p| p.actual > Decimal::ZERO) {
        txn.emit(record(
            TransactionKind::InvestorReturn,
            Some(payout.investor_id),
            payout.actual,
        ));
    }
}
