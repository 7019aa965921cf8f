use crate::core::ids::{AccountId, InvestmentId, InvoiceId, PoolId};
use crate::core::investment::Investment;
use crate::core::pool::FundingPool;
use crate::store::{FundingStore, PoolSnapshot, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

type Slot = Arc<Mutex<PoolSnapshot>>;

/// In-process store keeping each pool aggregate behind its own mutex.
///
/// A commit locks only the slot of the pool it writes, so pools never
/// contend with each other. Lock order is invoice index, then pool map,
/// then slot, then investment index.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pools: RwLock<HashMap<PoolId, Slot>>,
    by_invoice: RwLock<HashMap<InvoiceId, PoolId>>,
    by_investment: RwLock<HashMap<InvestmentId, PoolId>>,
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Unavailable(format!("{what} lock poisoned"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, pool_id: PoolId) -> Result<Slot, StoreError> {
        let pools = self.pools.read().map_err(|_| poisoned("pool map"))?;
        pools
            .get(&pool_id)
            .cloned()
            .ok_or(StoreError::PoolNotFound(pool_id))
    }

    fn lock(slot: &Slot) -> Result<MutexGuard<'_, PoolSnapshot>, StoreError> {
        slot.lock().map_err(|_| poisoned("pool slot"))
    }

    pub fn pool_count(&self) -> usize {
        self.pools.read().map(|p| p.len()).unwrap_or(0)
    }
}

impl FundingStore for MemoryStore {
    fn insert_pool(&self, pool: FundingPool) -> Result<(), StoreError> {
        let mut by_invoice = self.by_invoice.write().map_err(|_| poisoned("invoice index"))?;
        if by_invoice.contains_key(&pool.invoice_id()) {
            return Err(StoreError::Duplicate(pool.invoice_id()));
        }
        let mut pools = self.pools.write().map_err(|_| poisoned("pool map"))?;
        by_invoice.insert(pool.invoice_id(), pool.id());
        pools.insert(pool.id(), Arc::new(Mutex::new(PoolSnapshot::new(pool))));
        Ok(())
    }

    fn load(&self, pool_id: PoolId) -> Result<PoolSnapshot, StoreError> {
        let slot = self.slot(pool_id)?;
        let snapshot = Self::lock(&slot)?;
        Ok(snapshot.clone())
    }

    fn pool_for_invoice(&self, invoice_id: InvoiceId) -> Result<PoolId, StoreError> {
        let by_invoice = self.by_invoice.read().map_err(|_| poisoned("invoice index"))?;
        by_invoice
            .get(&invoice_id)
            .copied()
            .ok_or(StoreError::InvoiceNotFound(invoice_id))
    }

    fn pool_for_investment(&self, investment_id: InvestmentId) -> Result<PoolId, StoreError> {
        let by_investment = self
            .by_investment
            .read()
            .map_err(|_| poisoned("investment index"))?;
        by_investment
            .get(&investment_id)
            .copied()
            .ok_or(StoreError::InvestmentNotFound(investment_id))
    }

    fn pool_ids(&self) -> Result<Vec<PoolId>, StoreError> {
        let pools = self.pools.read().map_err(|_| poisoned("pool map"))?;
        Ok(pools.keys().copied().collect())
    }

    fn investments_by_investor(&self, investor_id: AccountId) -> Result<Vec<Investment>, StoreError> {
        let slots: Vec<Slot> = {
            let pools = self.pools.read().map_err(|_| poisoned("pool map"))?;
            pools.values().cloned().collect()
        };
        let mut found = Vec::new();
        for slot in &slots {
            let snapshot = Self::lock(slot)?;
            found.extend(
                snapshot
                    .investments
                    .iter()
                    .filter(|inv| inv.investor_id() == investor_id)
                    .cloned(),
            );
        }
        found.sort_by_key(|inv| inv.invested_at());
        Ok(found)
    }

    fn commit(&self, expected_version: u64, mut snapshot: PoolSnapshot) -> Result<(), StoreError> {
        let pool_id = snapshot.pool.id();
        let slot = self.slot(pool_id)?;
        let mut current = Self::lock(&slot)?;
        let actual = current.pool.version();
        if actual != expected_version {
            return Err(StoreError::Conflict {
                pool: pool_id,
                expected: expected_version,
                actual,
            });
        }

        snapshot.pool.bump_version();
        snapshot.sort_investments();
        let new_ids: Vec<InvestmentId> = snapshot
            .investments
            .iter()
            .map(|inv| inv.id())
            .filter(|id| !current.investments.iter().any(|known| known.id() == *id))
            .collect();

        if !new_ids.is_empty() {
            let mut by_investment = self
                .by_investment
                .write()
                .map_err(|_| poisoned("investment index"))?;
            for id in new_ids {
                by_investment.insert(id, pool_id);
            }
        }
        *current = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyCode;
    use crate::core::investment::NewInvestment;
    use crate::core::pool::PoolTerms;
    use crate::core::tranche::Tranche;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_pool() -> FundingPool {
        let terms = PoolTerms::new(
            InvoiceId::new(),
            dec!(1000),
            dec!(0.8),
            dec!(0.2),
            dec!(10),
            dec!(15),
            CurrencyCode::new("USD"),
        );
        let now = Utc::now();
        FundingPool::open(&terms, dec!(800), dec!(200), now, now)
    }

    fn investment(pool: &FundingPool, investor: AccountId) -> Investment {
        Investment::from_new(NewInvestment {
            pool_id: pool.id(),
            investor_id: investor,
            tranche: Tranche::Priority,
            amount: dec!(100),
            expected_return: dec!(101),
            interest_rate: dec!(10),
            days_to_maturity: 30,
            sequence: 0,
            invested_at: Utc::now(),
        })
    }

    #[test]
    fn test_insert_and_load() {
        let store = MemoryStore::new();
        let pool = sample_pool();
        let id = pool.id();
        let invoice = pool.invoice_id();
        store.insert_pool(pool).unwrap();

        let snapshot = store.load(id).unwrap();
        assert_eq!(snapshot.pool.id(), id);
        assert!(snapshot.investments.is_empty());
        assert_eq!(store.pool_for_invoice(invoice).unwrap(), id);
        assert_eq!(store.pool_count(), 1);
    }

    #[test]
    fn test_duplicate_invoice_rejected() {
        let store = MemoryStore::new();
        let pool = sample_pool();
        let terms = PoolTerms::new(
            pool.invoice_id(),
            dec!(1000),
            dec!(0.8),
            dec!(0.2),
            dec!(10),
            dec!(15),
            CurrencyCode::new("USD"),
        );
        let now = Utc::now();
        let twin = FundingPool::open(&terms, dec!(800), dec!(200), now, now);
        store.insert_pool(pool).unwrap();
        assert!(matches!(store.insert_pool(twin), Err(StoreError::Duplicate(_))));
    }

    #[test]
    fn test_commit_bumps_version_and_indexes() {
        let store = MemoryStore::new();
        let pool = sample_pool();
        let id = pool.id();
        store.insert_pool(pool).unwrap();

        let mut snapshot = store.load(id).unwrap();
        let investor = AccountId::new();
        let inv = investment(&snapshot.pool, investor);
        let inv_id = inv.id();
        snapshot.investments.push(inv);
        store.commit(0, snapshot).unwrap();

        let reloaded = store.load(id).unwrap();
        assert_eq!(reloaded.pool.version(), 1);
        assert_eq!(reloaded.investments.len(), 1);
        assert_eq!(store.pool_for_investment(inv_id).unwrap(), id);
        assert_eq!(store.investments_by_investor(investor).unwrap().len(), 1);
    }

    #[test]
    fn test_stale_commit_conflicts() {
        let store = MemoryStore::new();
        let pool = sample_pool();
        let id = pool.id();
        store.insert_pool(pool).unwrap();

        let first = store.load(id).unwrap();
        let second = store.load(id).unwrap();
        store.commit(0, first).unwrap();
        let err = store.commit(0, second).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_pool() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load(PoolId::new()),
            Err(StoreError::PoolNotFound(_))
        ));
        assert!(matches!(
            store.pool_for_investment(InvestmentId::new()),
            Err(StoreError::InvestmentNotFound(_))
        ));
    }
}
