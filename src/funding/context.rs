//! Shared engine context and the optimistic pool transaction.
//!
//! Every mutating operation runs as a closure over a [`PoolTxn`]: load the
//! pool aggregate, stage changes, then commit with a version check. A
//! conflicting commit re-runs the closure against a fresh snapshot, so
//! business checks always see the state they commit against.

use crate::config::EngineConfig;
use crate::core::ids::{PoolId, PoolRef};
use crate::core::investment::Investment;
use crate::core::pool::FundingPool;
use crate::core::transaction::{InvoiceStatus, TransactionRecord};
use crate::error::{FundingError, Result};
use crate::events::{FundingListener, PendingEvents};
use crate::store::{FundingStore, PoolSnapshot, StoreError};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Instant;

/// Unit of work over one pool aggregate.
///
/// Changes and events staged here become visible only if the surrounding
/// transaction commits.
#[derive(Debug)]
pub struct PoolTxn {
    snapshot: PoolSnapshot,
    expected_version: u64,
    events: PendingEvents,
    now: DateTime<Utc>,
}

impl PoolTxn {
    fn begin(snapshot: PoolSnapshot) -> Self {
        let expected_version = snapshot.pool.version();
        Self {
            snapshot,
            expected_version,
            events: PendingEvents::default(),
            now: Utc::now(),
        }
    }

    pub fn pool(&self) -> &FundingPool {
        &self.snapshot.pool
    }

    /// Investments in ledger order as of this transaction.
    pub fn investments(&self) -> &[Investment] {
        &self.snapshot.investments
    }

    /// Timestamp applied to every change in this transaction.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub(crate) fn pool_mut(&mut self) -> &mut FundingPool {
        &mut self.snapshot.pool
    }

    pub(crate) fn investments_mut(&mut self) -> &mut Vec<Investment> {
        &mut self.snapshot.investments
    }

    pub(crate) fn emit(&mut self, record: TransactionRecord) {
        self.events.transactions.push(record);
    }

    pub(crate) fn report_invoice(&mut self, status: InvoiceStatus) {
        let invoice_id = self.snapshot.pool.invoice_id();
        self.events.invoice_updates.push((invoice_id, status));
    }
}

/// Store, configuration and listener shared by all engine components.
#[derive(Clone)]
pub(crate) struct Context {
    pub store: Arc<dyn FundingStore>,
    pub config: Arc<EngineConfig>,
    pub listener: Arc<dyn FundingListener>,
}

impl Context {
    pub fn resolve(&self, pool: PoolRef) -> Result<PoolId> {
        match pool {
            PoolRef::Pool(id) => Ok(id),
            PoolRef::Invoice(invoice_id) => Ok(self.store.pool_for_invoice(invoice_id)?),
        }
    }

    pub fn load(&self, pool: PoolRef) -> Result<PoolSnapshot> {
        let pool_id = self.resolve(pool)?;
        Ok(self.store.load(pool_id)?)
    }

    pub fn publish(&self, events: PendingEvents) {
        events.deliver(self.listener.as_ref());
    }

    /// Run `work` atomically against one pool.
    ///
    /// Business errors from `work` abort immediately and nothing is
    /// written. Version conflicts retry until `max_commit_attempts` or the
    /// request timeout is exhausted, which surfaces as `Unavailable`.
    pub fn transact<T, F>(&self, pool_id: PoolId, operation: &'static str, mut work: F) -> Result<T>
    where
        F: FnMut(&mut PoolTxn) -> Result<T>,
    {
        let deadline = Instant::now() + self.config.request_timeout();
        let attempts = self.config.max_commit_attempts;

        for attempt in 1..=attempts {
            if Instant::now() >= deadline {
                warn!("{operation} on pool {pool_id} timed out after {} attempts", attempt - 1);
                return Err(FundingError::Unavailable(format!(
                    "{operation} on pool {pool_id} timed out"
                )));
            }

            let mut txn = PoolTxn::begin(self.store.load(pool_id)?);
            let output = work(&mut txn)?;
            let PoolTxn {
                snapshot,
                expected_version,
                events,
                ..
            } = txn;

            match self.store.commit(expected_version, snapshot) {
                Ok(()) => {
                    self.publish(events);
                    return Ok(output);
                }
                Err(StoreError::Conflict { actual, .. }) => {
                    debug!(
                        "{operation} on pool {pool_id}: version {expected_version} is stale (now {actual}), attempt {attempt}/{attempts}"
                    );
                    std::thread::yield_now();
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!("{operation} on pool {pool_id} gave up after {attempts} conflicting commits");
        Err(FundingError::Unavailable(format!(
            "{operation} on pool {pool_id} kept conflicting after {attempts} attempts"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyCode;
    use crate::core::ids::InvoiceId;
    use crate::core::pool::{PoolStatus, PoolTerms};
    use crate::events::RecordingListener;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    fn context_with_pool() -> (Context, PoolId, Arc<RecordingListener>) {
        let store = Arc::new(MemoryStore::new());
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
        let pool = FundingPool::open(&terms, dec!(800), dec!(200), now, now);
        let pool_id = pool.id();
        store.insert_pool(pool).unwrap();
        let listener = Arc::new(RecordingListener::new());
        let ctx = Context {
            store,
            config: Arc::new(EngineConfig::default()),
            listener: listener.clone(),
        };
        (ctx, pool_id, listener)
    }

    #[test]
    fn test_transact_commits_and_publishes() {
        let (ctx, pool_id, listener) = context_with_pool();
        ctx.transact(pool_id, "fill", |txn| {
            let now = txn.now();
            txn.pool_mut().advance(PoolStatus::Filled, now);
            txn.report_invoice(InvoiceStatus::Funded);
            Ok(())
        })
        .unwrap();

        let snapshot = ctx.store.load(pool_id).unwrap();
        assert_eq!(snapshot.pool.status(), PoolStatus::Filled);
        assert_eq!(snapshot.pool.version(), 1);
        assert_eq!(listener.invoice_updates().len(), 1);
    }

    #[test]
    fn test_transact_error_writes_nothing() {
        let (ctx, pool_id, listener) = context_with_pool();
        let result: Result<()> = ctx.transact(pool_id, "fail", |txn| {
            let now = txn.now();
            txn.pool_mut().advance(PoolStatus::Closed, now);
            txn.report_invoice(InvoiceStatus::Repaid);
            Err(FundingError::input("amount", "rejected"))
        });
        assert!(result.is_err());

        let snapshot = ctx.store.load(pool_id).unwrap();
        assert_eq!(snapshot.pool.status(), PoolStatus::Open);
        assert_eq!(snapshot.pool.version(), 0);
        assert!(listener.invoice_updates().is_empty());
    }

    #[test]
    fn test_transact_retries_on_conflict() {
        let (ctx, pool_id, _) = context_with_pool();
        let mut runs = 0;
        ctx.transact(pool_id, "racy", |_txn| {
            runs += 1;
            if runs == 1 {
                // A competing writer commits between our load and commit.
                let competing = ctx.store.load(pool_id)?;
                ctx.store.commit(competing.pool.version(), competing)?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(runs, 2);
        assert_eq!(ctx.store.load(pool_id).unwrap().pool.version(), 2);
    }

    #[test]
    fn test_resolve_by_invoice() {
        let (ctx, pool_id, _) = context_with_pool();
        let invoice = ctx.store.load(pool_id).unwrap().pool.invoice_id();
        assert_eq!(ctx.resolve(PoolRef::Invoice(invoice)).unwrap(), pool_id);
        assert!(matches!(
            ctx.resolve(PoolRef::Invoice(InvoiceId::new())),
            Err(FundingError::PoolNotFoundForInvoice(_))
        ));
    }
}
