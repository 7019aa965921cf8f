use crate::core::ids::{AccountId, InvestmentId, PoolId};
use crate::core::tranche::Tranche;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Settlement state of an investment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStatus {
    Active,
    Repaid,
    Defaulted,
}

impl InvestmentStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, InvestmentStatus::Active)
    }
}

impl fmt::Display for InvestmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvestmentStatus::Active => "active",
            InvestmentStatus::Repaid => "repaid",
            InvestmentStatus::Defaulted => "defaulted",
        };
        f.pad(s)
    }
}

/// One investor's commitment of capital to one tranche of a pool.
///
/// Principal, tranche and expected return are fixed at admission. The
/// only later mutation is the single transition out of `Active`, which
/// records the actual return and the settlement time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    id: InvestmentId,
    pool_id: PoolId,
    investor_id: AccountId,
    tranche: Tranche,
    /// Principal committed. Always positive.
    amount: Decimal,
    /// Principal plus interest accrued to maturity at commitment time.
    expected_return: Decimal,
    actual_return: Option<Decimal>,
    status: InvestmentStatus,
    /// Rate (percent p.a.) and tenor used for `expected_return`.
    interest_rate: Decimal,
    days_to_maturity: u32,
    /// Commitment order within the pool.
    sequence: u64,
    invested_at: DateTime<Utc>,
    repaid_at: Option<DateTime<Utc>>,
    settlement_reference: Option<String>,
}

/// Shape of a new commitment, validated by the ledger before it is recorded.
#[derive(Debug, Clone)]
pub(crate) struct NewInvestment {
    pub pool_id: PoolId,
    pub investor_id: AccountId,
    pub tranche: Tranche,
    pub amount: Decimal,
    pub expected_return: Decimal,
    pub interest_rate: Decimal,
    pub days_to_maturity: u32,
    pub sequence: u64,
    pub invested_at: DateTime<Utc>,
}

impl Investment {
    pub(crate) fn from_new(new: NewInvestment) -> Self {
        Self {
            id: InvestmentId::new(),
            pool_id: new.pool_id,
            investor_id: new.investor_id,
            tranche: new.tranche,
            amount: new.amount,
            expected_return: new.expected_return,
            actual_return: None,
            status: InvestmentStatus::Active,
            interest_rate: new.interest_rate,
            days_to_maturity: new.days_to_maturity,
            sequence: new.sequence,
            invested_at: new.invested_at,
            repaid_at: None,
            settlement_reference: None,
        }
    }

    /// Move out of `Active`. Callers check the current status first.
    pub(crate) fn settle(
        &mut self,
        status: InvestmentStatus,
        actual_return: Decimal,
        at: DateTime<Utc>,
        reference: Option<String>,
    ) {
        self.status = status;
        self.actual_return = Some(actual_return);
        self.repaid_at = Some(at);
        self.settlement_reference = reference;
    }

    /// Sort key of the ledger order: tranche, then commit sequence.
    /// Wall-clock timestamps may step backwards, so they are not used.
    pub(crate) fn ledger_key(&self) -> (Tranche, u64) {
        (self.tranche, self.sequence)
    }

    // --- Accessors ---

    pub fn id(&self) -> InvestmentId {
        self.id
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn investor_id(&self) -> AccountId {
        self.investor_id
    }

    pub fn tranche(&self) -> Tranche {
        self.tranche
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn expected_return(&self) -> Decimal {
        self.expected_return
    }

    /// Interest component of the expected return.
    pub fn expected_gain(&self) -> Decimal {
        self.expected_return - self.amount
    }

    pub fn actual_return(&self) -> Option<Decimal> {
        self.actual_return
    }

    /// Realized profit or loss once settled.
    pub fn realized_gain(&self) -> Option<Decimal> {
        self.actual_return.map(|actual| actual - self.amount)
    }

    pub fn status(&self) -> InvestmentStatus {
        self.status
    }

    pub fn interest_rate(&self) -> Decimal {
        self.interest_rate
    }

    pub fn days_to_maturity(&self) -> u32 {
        self.days_to_maturity
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn invested_at(&self) -> DateTime<Utc> {
        self.invested_at
    }

    pub fn repaid_at(&self) -> Option<DateTime<Utc>> {
        self.repaid_at
    }

    pub fn settlement_reference(&self) -> Option<&str> {
        self.settlement_reference.as_deref()
    }
}
