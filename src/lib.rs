//! # tranche-pool
//!
//! Two-tranche invoice funding pools with atomic admission and waterfall
//! settlement.
//!
//! An approved invoice opens a pool split into a senior **Priority**
//! tranche and a junior first-loss **Catalyst** tranche. Investors commit
//! capital into either tranche without ever overfilling it, even under
//! concurrent load. When the invoice is repaid, the engine computes
//! per-investment payouts exactly in decimal arithmetic, either pro-rata
//! or senior-first, and closes the pool.
//!
//! ## Architecture
//!
//! - **core**: Foundational types: currencies, ids, tranches, pools, investments
//! - **store**: Persistence seam and the in-memory pool store
//! - **funding**: Pool lifecycle, investment ledger and admission
//! - **settlement**: Fee, pro-rata and tranche-priority payout computation
//! - **engine**: Facade wiring the components to one store
//! - **simulation**: Random investment flows and concurrent admission runs

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod events;
pub mod funding;
pub mod settlement;
pub mod simulation;
pub mod store;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::config::{EngineConfig, SurplusPolicy};
    pub use crate::core::currency::CurrencyCode;
    pub use crate::core::ids::{AccountId, InvestmentId, InvoiceId, PoolId, PoolRef};
    pub use crate::core::investment::{Investment, InvestmentStatus};
    pub use crate::core::pool::{FundingPool, PoolStatus, PoolTerms};
    pub use crate::core::tranche::Tranche;
    pub use crate::core::transaction::{InvoiceStatus, TransactionKind, TransactionRecord};
    pub use crate::engine::FundingEngine;
    pub use crate::error::{ErrorKind, FundingError};
    pub use crate::events::{FundingListener, NoopListener, RecordingListener};
    pub use crate::funding::{CatalystConsents, InvestRequest};
    pub use crate::settlement::{SettlementPolicy, SettlementReport};
    pub use crate::store::{FundingStore, MemoryStore};
}
