use crate::core::currency::CurrencyCode;
use crate::core::ids::{AccountId, InvoiceId, PoolId};
use crate::core::investment::{Investment, InvestmentStatus};
use crate::core::tranche::{percentage, Tranche, TrancheBook};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a pool. Variants are ordered; a pool only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Open,
    Filled,
    Disbursed,
    Closed,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolStatus::Open => "open",
            PoolStatus::Filled => "filled",
            PoolStatus::Disbursed => "disbursed",
            PoolStatus::Closed => "closed",
        };
        f.pad(s)
    }
}

/// Terms a pool is opened with, as resolved by the invoice and grading
/// services before creation.
///
/// Ratios are fractions of the target (`0.8` = 80%). Rates are percent
/// per annum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolTerms {
    pub invoice_id: InvoiceId,
    pub target_amount: Decimal,
    pub priority_ratio: Decimal,
    pub catalyst_ratio: Decimal,
    pub priority_rate: Decimal,
    pub catalyst_rate: Decimal,
    pub currency: CurrencyCode,
    /// Exporter that owns the invoice and receives the advance.
    #[serde(default)]
    pub owner: Option<AccountId>,
    /// Invoice due date; drives tenor for new investments.
    #[serde(default)]
    pub maturity_date: Option<DateTime<Utc>>,
    /// Funding deadline; defaults from configuration when absent.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl PoolTerms {
    pub fn new(
        invoice_id: InvoiceId,
        target_amount: Decimal,
        priority_ratio: Decimal,
        catalyst_ratio: Decimal,
        priority_rate: Decimal,
        catalyst_rate: Decimal,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            invoice_id,
            target_amount,
            priority_ratio,
            catalyst_ratio,
            priority_rate,
            catalyst_rate,
            currency,
            owner: None,
            maturity_date: None,
            deadline: None,
        }
    }

    pub fn with_owner(mut self, owner: AccountId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_maturity(mut self, maturity_date: DateTime<Utc>) -> Self {
        self.maturity_date = Some(maturity_date);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Aggregate state of one invoice's funding vehicle.
///
/// `funded_amount` is always the sum of both tranches' `funded`, and
/// `version` increments on every committed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingPool {
    id: PoolId,
    invoice_id: InvoiceId,
    owner: Option<AccountId>,
    currency: CurrencyCode,
    target_amount: Decimal,
    funded_amount: Decimal,
    priority: TrancheBook,
    catalyst: TrancheBook,
    investor_count: u32,
    status: PoolStatus,
    maturity_date: Option<DateTime<Utc>>,
    deadline: DateTime<Utc>,
    opened_at: DateTime<Utc>,
    filled_at: Option<DateTime<Utc>>,
    disbursed_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl FundingPool {
    /// Build an open pool. Targets are already rounded and validated.
    pub(crate) fn open(
        terms: &PoolTerms,
        priority_target: Decimal,
        catalyst_target: Decimal,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PoolId::new(),
            invoice_id: terms.invoice_id,
            owner: terms.owner,
            currency: terms.currency.clone(),
            target_amount: terms.target_amount,
            funded_amount: Decimal::ZERO,
            priority: TrancheBook::new(priority_target, terms.priority_rate),
            catalyst: TrancheBook::new(catalyst_target, terms.catalyst_rate),
            investor_count: 0,
            status: PoolStatus::Open,
            maturity_date: terms.maturity_date,
            deadline,
            opened_at: now,
            filled_at: None,
            disbursed_at: None,
            closed_at: None,
            updated_at: now,
            version: 0,
        }
    }

    /// Apply a newly admitted commitment to the aggregate counters.
    pub(crate) fn add_funding(&mut self, tranche: Tranche, amount: Decimal, now: DateTime<Utc>) {
        self.tranche_mut(tranche).funded += amount;
        self.funded_amount += amount;
        self.investor_count += 1;
        self.updated_at = now;
    }

    /// Move to `next`, stamping the transition time.
    ///
    /// Returns `false` without changing anything if `next` is not ahead of
    /// the current status.
    pub(crate) fn advance(&mut self, next: PoolStatus, now: DateTime<Utc>) -> bool {
        if next <= self.status {
            return false;
        }
        match next {
            PoolStatus::Open => {}
            PoolStatus::Filled => self.filled_at = Some(now),
            PoolStatus::Disbursed => self.disbursed_at = Some(now),
            PoolStatus::Closed => self.closed_at = Some(now),
        }
        self.status = next;
        self.updated_at = now;
        true
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    fn tranche_mut(&mut self, tranche: Tranche) -> &mut TrancheBook {
        match tranche {
            Tranche::Priority => &mut self.priority,
            Tranche::Catalyst => &mut self.catalyst,
        }
    }

    /// Verify the aggregate against the investments the pool owns.
    ///
    /// Funded counters must equal committed principal, stay within
    /// targets, and an open pool may only hold active investments.
    pub fn check_invariants(&self, investments: &[Investment]) -> Result<(), String> {
        for tranche in Tranche::ALL {
            let book = self.tranche(tranche);
            let committed: Decimal = investments
                .iter()
                .filter(|inv| inv.tranche() == tranche)
                .map(|inv| inv.amount())
                .sum();
            if committed != book.funded {
                return Err(format!(
                    "{tranche} funded {} differs from committed principal {committed}",
                    book.funded
                ));
            }
            if book.funded > book.target {
                return Err(format!(
                    "{tranche} funded {} exceeds target {}",
                    book.funded, book.target
                ));
            }
        }
        if self.priority.funded + self.catalyst.funded != self.funded_amount {
            return Err(format!(
                "funded amount {} differs from tranche sum",
                self.funded_amount
            ));
        }
        if self.funded_amount > self.target_amount {
            return Err(format!(
                "funded amount {} exceeds target {}",
                self.funded_amount, self.target_amount
            ));
        }
        if self.status == PoolStatus::Open
            && investments.iter().any(|inv| inv.status() != InvestmentStatus::Active)
        {
            return Err("open pool holds settled investments".to_string());
        }
        Ok(())
    }

    // --- Accessors ---

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    pub fn owner(&self) -> Option<AccountId> {
        self.owner
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn target_amount(&self) -> Decimal {
        self.target_amount
    }

    pub fn funded_amount(&self) -> Decimal {
        self.funded_amount
    }

    pub fn tranche(&self, tranche: Tranche) -> &TrancheBook {
        match tranche {
            Tranche::Priority => &self.priority,
            Tranche::Catalyst => &self.catalyst,
        }
    }

    pub fn investor_count(&self) -> u32 {
        self.investor_count
    }

    pub fn status(&self) -> PoolStatus {
        self.status
    }

    pub fn maturity_date(&self) -> Option<DateTime<Utc>> {
        self.maturity_date
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn filled_at(&self) -> Option<DateTime<Utc>> {
        self.filled_at
    }

    pub fn disbursed_at(&self) -> Option<DateTime<Utc>> {
        self.disbursed_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    // --- Progress ---

    pub fn remaining_amount(&self) -> Decimal {
        (self.target_amount - self.funded_amount).max(Decimal::ZERO)
    }

    pub fn is_fully_funded(&self) -> bool {
        self.funded_amount >= self.target_amount
    }

    pub fn percentage_funded(&self) -> f64 {
        percentage(self.funded_amount, self.target_amount)
    }
}

impl fmt::Display for FundingPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Pool {} ===", self.id)?;
        writeln!(f, "Invoice:   {}", self.invoice_id)?;
        writeln!(f, "Status:    {}", self.status)?;
        writeln!(
            f,
            "Funded:    {} / {} {} ({:.1}%)",
            self.funded_amount,
            self.target_amount,
            self.currency,
            self.percentage_funded()
        )?;
        for tranche in Tranche::ALL {
            let book = self.tranche(tranche);
            writeln!(
                f,
                "  {:<9} {} / {} @ {}% p.a.",
                tranche, book.funded, book.target, book.interest_rate
            )?;
        }
        writeln!(f, "Investors: {}", self.investor_count)
    }
}
