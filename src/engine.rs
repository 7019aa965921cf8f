use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::{FundingListener, NoopListener};
use crate::funding::context::Context;
use crate::funding::{Admission, InvestmentLedger, PoolLifecycle};
use crate::settlement::SettlementEngine;
use crate::store::{FundingStore, MemoryStore};
use std::sync::Arc;

/// The four funding components wired to one store, configuration and
/// listener.
///
/// `FundingEngine` is `Send + Sync`; share it across request threads
/// behind an `Arc`.
///
/// ```
/// use rust_decimal_macros::dec;
/// use tranche_pool::prelude::*;
///
/// let engine = FundingEngine::in_memory(EngineConfig::default()).unwrap();
/// let terms = engine.config().pool_terms(InvoiceId::new(), dec!(1000));
/// let pool = engine.lifecycle().create_pool(terms).unwrap();
/// assert_eq!(pool.tranche(Tranche::Priority).target, dec!(800));
/// ```
pub struct FundingEngine {
    config: Arc<EngineConfig>,
    store: Arc<dyn FundingStore>,
    lifecycle: PoolLifecycle,
    ledger: InvestmentLedger,
    admission: Admission,
    settlement: SettlementEngine,
}

impl FundingEngine {
    /// Build an engine over `store`. The configuration is validated first.
    pub fn new(
        store: Arc<dyn FundingStore>,
        config: EngineConfig,
        listener: Arc<dyn FundingListener>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let ctx = Context {
            store: store.clone(),
            config: config.clone(),
            listener,
        };
        Ok(Self {
            config,
            store,
            lifecycle: PoolLifecycle::new(ctx.clone()),
            ledger: InvestmentLedger::new(ctx.clone()),
            admission: Admission::new(ctx.clone()),
            settlement: SettlementEngine::new(ctx),
        })
    }

    /// Engine over a fresh [`MemoryStore`] that discards events.
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::new(Arc::new(MemoryStore::new()), config, Arc::new(NoopListener))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn FundingStore> {
        &self.store
    }

    pub fn lifecycle(&self) -> &PoolLifecycle {
        &self.lifecycle
    }

    pub fn ledger(&self) -> &InvestmentLedger {
        &self.ledger
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn settlement(&self) -> &SettlementEngine {
        &self.settlement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurplusPolicy;
    use crate::core::ids::{AccountId, InvoiceId};
    use crate::core::pool::PoolStatus;
    use crate::core::tranche::Tranche;
    use crate::error::FundingError;
    use rust_decimal_macros::dec;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_engine_is_shareable() {
        assert_send_sync::<FundingEngine>();
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            max_commit_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(
            FundingEngine::in_memory(config),
            Err(FundingError::Config(_))
        ));
    }

    #[test]
    fn test_fill_disburse_settle() {
        let engine = FundingEngine::in_memory(EngineConfig {
            surplus_policy: SurplusPolicy::AccrueToPlatform,
            ..Default::default()
        })
        .unwrap();
        let terms = engine.config().pool_terms(InvoiceId::new(), dec!(1000));
        let pool = engine.lifecycle().create_pool(terms).unwrap();

        let admission = engine.admission();
        admission
            .admit(pool.id(), AccountId::new(), Tranche::Priority, dec!(800), dec!(10), 30)
            .unwrap();
        admission
            .admit(pool.id(), AccountId::new(), Tranche::Catalyst, dec!(200), dec!(15), 30)
            .unwrap();
        assert_eq!(engine.lifecycle().pool(pool.id()).unwrap().status(), PoolStatus::Filled);

        engine.lifecycle().disburse(pool.id()).unwrap();
        let report = engine
            .settlement()
            .settle_tranche_priority(pool.id(), dec!(1100))
            .unwrap();
        assert!(report.is_conserved());
        assert_eq!(engine.lifecycle().pool(pool.id()).unwrap().status(), PoolStatus::Closed);
    }
}
