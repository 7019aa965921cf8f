//! Persistence seam for pools and the investments they own.
//!
//! A pool and its investments form one aggregate. Reads return a
//! consistent [`PoolSnapshot`]; writes replace the whole aggregate through
//! [`FundingStore::commit`], which succeeds only if the stored version
//! still equals the version the snapshot was read at.

pub mod memory;

use crate::core::ids::{AccountId, InvestmentId, InvoiceId, PoolId};
use crate::core::investment::Investment;
use crate::core::pool::FundingPool;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("pool {0} not found")]
    PoolNotFound(PoolId),
    #[error("no pool for invoice {0}")]
    InvoiceNotFound(InvoiceId),
    #[error("investment {0} not found")]
    InvestmentNotFound(InvestmentId),
    #[error("pool already exists for invoice {0}")]
    Duplicate(InvoiceId),
    #[error("pool {pool} changed: expected version {expected}, found {actual}")]
    Conflict {
        pool: PoolId,
        expected: u64,
        actual: u64,
    },
    #[error("{0}")]
    Unavailable(String),
}

/// A pool together with its investments in ledger order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub pool: FundingPool,
    pub investments: Vec<Investment>,
}

impl PoolSnapshot {
    pub fn new(pool: FundingPool) -> Self {
        Self {
            pool,
            investments: Vec::new(),
        }
    }

    /// Priority before Catalyst, each in commit order.
    pub fn sort_investments(&mut self) {
        self.investments.sort_by_key(|inv| inv.ledger_key());
    }
}

pub trait FundingStore: Send + Sync {
    /// Insert a freshly opened pool. Fails with `Duplicate` if the invoice
    /// already has one.
    fn insert_pool(&self, pool: FundingPool) -> Result<(), StoreError>;

    /// Read a pool and its investments.
    fn load(&self, pool_id: PoolId) -> Result<PoolSnapshot, StoreError>;

    fn pool_for_invoice(&self, invoice_id: InvoiceId) -> Result<PoolId, StoreError>;

    fn pool_for_investment(&self, investment_id: InvestmentId) -> Result<PoolId, StoreError>;

    fn pool_ids(&self) -> Result<Vec<PoolId>, StoreError>;

    fn investments_by_investor(&self, investor_id: AccountId) -> Result<Vec<Investment>, StoreError>;

    /// Replace the aggregate if its stored version is `expected_version`.
    ///
    /// The store assigns the next version on success. Either every change
    /// in the snapshot is applied or none is.
    fn commit(&self, expected_version: u64, snapshot: PoolSnapshot) -> Result<(), StoreError>;
}
