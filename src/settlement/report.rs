use crate::config::SurplusPolicy;
use crate::core::currency::CurrencyCode;
use crate::core::ids::{AccountId, InvestmentId, InvoiceId, PoolId};
use crate::core::investment::InvestmentStatus;
use crate::core::tranche::Tranche;
use crate::core::transaction::InvoiceStatus;
use crate::settlement::SettlementPolicy;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How much of its expected return an investment received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    Full,
    Partial,
    None,
}

impl Coverage {
    pub fn of(actual: Decimal, expected: Decimal) -> Self {
        if actual >= expected {
            Coverage::Full
        } else if actual > Decimal::ZERO {
            Coverage::Partial
        } else {
            Coverage::None
        }
    }
}

/// Payout decided for one investment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorPayout {
    pub investment_id: InvestmentId,
    pub investor_id: AccountId,
    pub tranche: Tranche,
    pub principal: Decimal,
    pub expected: Decimal,
    pub actual: Decimal,
    pub status: InvestmentStatus,
    pub coverage: Coverage,
}

impl InvestorPayout {
    /// Profit (or loss, if negative) against principal.
    pub fn gain(&self) -> Decimal {
        self.actual - self.principal
    }
}

/// Cash left after every investment reached its cap, and where it went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surplus {
    pub amount: Decimal,
    pub policy: SurplusPolicy,
}

impl Surplus {
    /// Part of the surplus not paid to investors.
    pub fn retained(&self) -> Decimal {
        match self.policy {
            SurplusPolicy::ProRataBonus => Decimal::ZERO,
            SurplusPolicy::ReturnToExporter | SurplusPolicy::AccrueToPlatform => self.amount,
        }
    }
}

/// Outcome of settling one pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReport {
    pub settlement_id: Uuid,
    pub pool_id: PoolId,
    pub invoice_id: InvoiceId,
    pub policy: SettlementPolicy,
    pub currency: CurrencyCode,
    pub gross_amount: Decimal,
    pub platform_fee: Decimal,
    pub net_amount: Decimal,
    pub total_expected: Decimal,
    pub priority_distributed: Decimal,
    pub catalyst_distributed: Decimal,
    pub priority_fully_paid: bool,
    pub catalyst_fully_paid: bool,
    pub surplus: Option<Surplus>,
    /// In ledger order.
    pub payouts: Vec<InvestorPayout>,
    pub invoice_outcome: InvoiceStatus,
    pub settled_at: DateTime<Utc>,
}

impl SettlementReport {
    pub fn total_distributed(&self) -> Decimal {
        self.priority_distributed + self.catalyst_distributed
    }

    pub fn surplus_amount(&self) -> Decimal {
        self.surplus.as_ref().map_or(Decimal::ZERO, |s| s.amount)
    }

    /// Every unit of the net amount is either paid out or retained as
    /// surplus.
    pub fn is_conserved(&self) -> bool {
        let retained = self.surplus.as_ref().map_or(Decimal::ZERO, Surplus::retained);
        let paid: Decimal = self.payouts.iter().map(|p| p.actual).sum();
        paid == self.total_distributed() && paid + retained == self.net_amount
    }

    pub fn payout(&self, investment_id: InvestmentId) -> Option<&InvestorPayout> {
        self.payouts.iter().find(|p| p.investment_id == investment_id)
    }

    pub fn defaulted(&self) -> impl Iterator<Item = &InvestorPayout> {
        self.payouts
            .iter()
            .filter(|p| p.status == InvestmentStatus::Defaulted)
    }
}

impl fmt::Display for SettlementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Settlement ({}) ===", self.policy)?;
        writeln!(f, "Pool:         {}", self.pool_id)?;
        writeln!(f, "Gross:        {} {}", self.gross_amount, self.currency)?;
        writeln!(f, "Platform fee: {}", self.platform_fee)?;
        writeln!(f, "Net:          {}", self.net_amount)?;
        writeln!(
            f,
            "Priority:     {} ({})",
            self.priority_distributed,
            if self.priority_fully_paid { "paid in full" } else { "short" }
        )?;
        writeln!(
            f,
            "Catalyst:     {} ({})",
            self.catalyst_distributed,
            if self.catalyst_fully_paid { "paid in full" } else { "short" }
        )?;
        if let Some(surplus) = &self.surplus {
            writeln!(f, "Surplus:      {} ({})", surplus.amount, surplus.policy)?;
        }
        writeln!(f, "Invoice:      {}", self.invoice_outcome)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:<38} {:<9} {:>16} {:>16} {:>16}  {}",
            "investment", "tranche", "principal", "expected", "actual", "status"
        )?;
        for p in &self.payouts {
            writeln!(
                f,
                "{:<38} {:<9} {:>16} {:>16} {:>16}  {}",
                p.investment_id.to_string(),
                p.tranche.as_str(),
                p.principal.to_string(),
                p.expected.to_string(),
                p.actual.to_string(),
                p.status
            )?;
        }
        Ok(())
    }
}
