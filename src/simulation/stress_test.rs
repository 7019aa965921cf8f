//! Stress testing utilities for the funding engine.
//!
//! Generates random investment flows and races them against one pool from
//! several threads, then checks that no tranche was overfilled and that
//! the pool's counters still agree with its investments.

use crate::core::currency::CurrencyCode;
use crate::core::ids::{AccountId, InvoiceId, PoolId};
use crate::core::tranche::Tranche;
use crate::engine::FundingEngine;
use crate::error::{ErrorKind, Result};
use crate::funding::InvestRequest;
use crate::settlement::{SettlementPolicy, SettlementReport};
use log::info;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

/// Shape of a randomly generated investment flow.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Number of investment orders to generate.
    pub order_count: usize,
    /// Distinct investors placing them.
    pub investor_count: usize,
    /// Smallest ticket, in whole currency units.
    pub min_ticket: u64,
    /// Largest ticket, in whole currency units.
    pub max_ticket: u64,
    /// Probability that an order targets the Catalyst tranche.
    pub catalyst_share: f64,
    pub currency: CurrencyCode,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            order_count: 200,
            investor_count: 50,
            min_ticket: 1_000,
            max_ticket: 50_000,
            catalyst_share: 0.25,
            currency: CurrencyCode::new("IDR"),
        }
    }
}

/// One generated order, not yet bound to a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedOrder {
    pub investor_id: AccountId,
    pub tranche: Tranche,
    pub amount: Decimal,
}

/// Generate a random order flow. Amounts are whole units of the currency.
pub fn generate_investment_flow(config: &FlowConfig) -> Vec<SimulatedOrder> {
    let mut rng = rand::thread_rng();
    let investors: Vec<AccountId> = (0..config.investor_count.max(1))
        .map(|_| AccountId::new())
        .collect();
    let max_ticket = config.max_ticket.max(config.min_ticket);

    (0..config.order_count)
        .map(|_| {
            let tranche = if rng.gen_bool(config.catalyst_share.clamp(0.0, 1.0)) {
                Tranche::Catalyst
            } else {
                Tranche::Priority
            };
            SimulatedOrder {
                investor_id: investors[rng.gen_range(0..investors.len())],
                tranche,
                amount: Decimal::from(rng.gen_range(config.min_ticket..=max_ticket)),
            }
        })
        .collect()
}

/// Tally of a concurrent admission run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StressOutcome {
    pub admitted: usize,
    pub rejected_capacity: usize,
    pub rejected_state: usize,
    pub rejected_other: usize,
    pub unavailable: usize,
    pub admitted_amount: Decimal,
    pub funded_amount: Decimal,
    pub target_amount: Decimal,
    /// Whether the pool aggregate matched its investments after the run.
    pub invariants_hold: bool,
    pub elapsed: Duration,
}

impl StressOutcome {
    fn merge(&mut self, other: StressOutcome) {
        self.admitted += other.admitted;
        self.rejected_capacity += other.rejected_capacity;
        self.rejected_state += other.rejected_state;
        self.rejected_other += other.rejected_other;
        self.unavailable += other.unavailable;
        self.admitted_amount += other.admitted_amount;
    }

    pub fn total_orders(&self) -> usize {
        self.admitted
            + self.rejected_capacity
            + self.rejected_state
            + self.rejected_other
            + self.unavailable
    }
}

/// Submit `orders` to one pool from `threads` threads at once.
pub fn run_concurrent_admission(
    engine: &FundingEngine,
    pool_id: PoolId,
    orders: &[SimulatedOrder],
    threads: usize,
) -> Result<StressOutcome> {
    let started = Instant::now();
    let chunk = orders.len().div_ceil(threads.max(1)).max(1);

    let mut outcome = thread::scope(|scope| {
        let workers: Vec<_> = orders
            .chunks(chunk)
            .map(|batch| {
                scope.spawn(move || {
                    let mut tally = StressOutcome::default();
                    for order in batch {
                        let request =
                            InvestRequest::new(pool_id, order.investor_id, order.tranche, order.amount)
                                .with_all_consents();
                        match engine.admission().invest(&request) {
                            Ok(_) => {
                                tally.admitted += 1;
                                tally.admitted_amount += order.amount;
                            }
                            Err(e) => match e.kind() {
                                ErrorKind::ExceedsCapacity => tally.rejected_capacity += 1,
                                ErrorKind::InvalidState => tally.rejected_state += 1,
                                ErrorKind::Unavailable => tally.unavailable += 1,
                                _ => tally.rejected_other += 1,
                            },
                        }
                    }
                    tally
                })
            })
            .collect();

        let mut total = StressOutcome::default();
        for worker in workers {
            match worker.join() {
                Ok(tally) => total.merge(tally),
                Err(payload) => std::panic::resume_unwind(payload),
            }
        }
        total
    });

    let snapshot = engine.store().load(pool_id)?;
    outcome.funded_amount = snapshot.pool.funded_amount();
    outcome.target_amount = snapshot.pool.target_amount();
    outcome.invariants_hold = snapshot.pool.check_invariants(&snapshot.investments).is_ok()
        && outcome.funded_amount == outcome.admitted_amount;
    outcome.elapsed = started.elapsed();
    Ok(outcome)
}

/// Parameters of an end-to-end simulated pool.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub target_amount: Decimal,
    pub flow: FlowConfig,
    pub threads: usize,
    pub policy: SettlementPolicy,
    /// Repayment as a fraction of the amount funded, e.g. `1.05`.
    pub repayment_ratio: Decimal,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            target_amount: Decimal::from(1_000_000),
            flow: FlowConfig::default(),
            threads: 8,
            policy: SettlementPolicy::TranchePriority,
            repayment_ratio: Decimal::new(105, 2),
        }
    }
}

/// Result of [`run_scenario`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub admission: StressOutcome,
    pub settlement: Option<SettlementReport>,
}

/// Open a pool, race a random flow into it, disburse (or close early if
/// it did not fill) and settle it.
pub fn run_scenario(engine: &FundingEngine, config: &ScenarioConfig) -> Result<ScenarioResult> {
    let mut terms = engine.config().pool_terms(InvoiceId::new(), config.target_amount);
    terms.currency = config.flow.currency.clone();
    let pool = engine.lifecycle().create_pool(terms)?;

    let orders = generate_investment_flow(&config.flow);
    let admission = run_concurrent_admission(engine, pool.id(), &orders, config.threads)?;
    info!(
        "simulated {} orders: {} admitted, {} over capacity, funded {} of {}",
        admission.total_orders(),
        admission.admitted,
        admission.rejected_capacity,
        admission.funded_amount,
        admission.target_amount
    );

    if admission.admitted == 0 {
        return Ok(ScenarioResult {
            admission,
            settlement: None,
        });
    }

    if engine.lifecycle().pool(pool.id())?.is_fully_funded() {
        engine.lifecycle().disburse(pool.id())?;
    } else {
        engine.lifecycle().close_early(pool.id())?;
    }

    let gross = pool
        .currency()
        .round(admission.funded_amount * config.repayment_ratio);
    let report = engine.settlement().settle(config.policy, pool.id(), gross)?;
    Ok(ScenarioResult {
        admission,
        settlement: Some(report),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::ids::InvestmentId;
    use crate::core::investment::Investment;
    use crate::core::pool::FundingPool;
    use crate::events::NoopListener;
    use crate::store::{FundingStore, MemoryStore, PoolSnapshot, StoreError};
    use std::sync::Arc;

    /// Delegates to a `MemoryStore` but panics on every commit.
    struct PanickingStore(MemoryStore);

    impl FundingStore for PanickingStore {
        fn insert_pool(&self, pool: FundingPool) -> std::result::Result<(), StoreError> {
            self.0.insert_pool(pool)
        }

        fn load(&self, pool_id: PoolId) -> std::result::Result<PoolSnapshot, StoreError> {
            self.0.load(pool_id)
        }

        fn pool_for_invoice(&self, invoice_id: InvoiceId) -> std::result::Result<PoolId, StoreError> {
            self.0.pool_for_invoice(invoice_id)
        }

        fn pool_for_investment(
            &self,
            investment_id: InvestmentId,
        ) -> std::result::Result<PoolId, StoreError> {
            self.0.pool_for_investment(investment_id)
        }

        fn pool_ids(&self) -> std::result::Result<Vec<PoolId>, StoreError> {
            self.0.pool_ids()
        }

        fn investments_by_investor(
            &self,
            investor_id: AccountId,
        ) -> std::result::Result<Vec<Investment>, StoreError> {
            self.0.investments_by_investor(investor_id)
        }

        fn commit(&self, _: u64, _: PoolSnapshot) -> std::result::Result<(), StoreError> {
            panic!("store crashed");
        }
    }

    #[test]
    fn test_random_flow_generation() {
        let config = FlowConfig {
            order_count: 40,
            investor_count: 5,
            min_ticket: 10,
            max_ticket: 20,
            ..Default::default()
        };
        let orders = generate_investment_flow(&config);
        assert_eq!(orders.len(), 40);
        assert!(orders
            .iter()
            .all(|o| o.amount >= Decimal::from(10) && o.amount <= Decimal::from(20)));
    }

    #[test]
    fn test_concurrent_admission_never_overfills() {
        let engine = FundingEngine::in_memory(EngineConfig {
            max_commit_attempts: 10_000,
            request_timeout_ms: 60_000,
            ..Default::default()
        })
        .unwrap();
        let terms = engine.config().pool_terms(InvoiceId::new(), Decimal::from(100_000));
        let pool = engine.lifecycle().create_pool(terms).unwrap();

        let orders = generate_investment_flow(&FlowConfig {
            order_count: 120,
            min_ticket: 500,
            max_ticket: 5_000,
            ..Default::default()
        });
        let outcome = run_concurrent_admission(&engine, pool.id(), &orders, 6).unwrap();

        assert!(outcome.invariants_hold);
        assert_eq!(outcome.total_orders(), 120);
        assert_eq!(outcome.unavailable, 0);
        assert!(outcome.funded_amount <= outcome.target_amount);
    }

    #[test]
    #[should_panic(expected = "store crashed")]
    fn test_worker_panic_is_not_swallowed() {
        let engine = FundingEngine::new(
            Arc::new(PanickingStore(MemoryStore::new())),
            EngineConfig::default(),
            Arc::new(NoopListener),
        )
        .unwrap();
        let terms = engine.config().pool_terms(InvoiceId::new(), Decimal::from(10_000));
        let pool = engine.lifecycle().create_pool(terms).unwrap();

        let orders = generate_investment_flow(&FlowConfig {
            order_count: 8,
            min_ticket: 100,
            max_ticket: 200,
            ..Default::default()
        });
        let _ = run_concurrent_admission(&engine, pool.id(), &orders, 2);
    }

    #[test]
    fn test_scenario_settles_and_conserves() {
        let engine = FundingEngine::in_memory(EngineConfig {
            max_commit_attempts: 10_000,
            request_timeout_ms: 60_000,
            ..Default::default()
        })
        .unwrap();
        let result = run_scenario(
            &engine,
            &ScenarioConfig {
                target_amount: Decimal::from(50_000),
                threads: 4,
                ..Default::default()
            },
        )
        .unwrap();
        let report = result.settlement.unwrap();
        assert!(report.is_conserved());
    }
}
