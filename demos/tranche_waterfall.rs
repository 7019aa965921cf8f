//! Tranche waterfall example.
//!
//! Funds one invoice pool with a senior and a junior investor, then settles
//! the same repayment under each surplus policy and after a shortfall, to
//! show who absorbs what.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tranche_pool::prelude::*;

fn funded_engine(surplus_policy: SurplusPolicy) -> (FundingEngine, PoolId) {
    let engine = FundingEngine::in_memory(EngineConfig {
        surplus_policy,
        ..Default::default()
    })
    .expect("default config is valid");

    let terms = engine
        .config()
        .pool_terms(InvoiceId::new(), dec!(1_000_000))
        .with_owner(AccountId::new());
    let pool = engine.lifecycle().create_pool(terms).expect("pool opens");

    let admission = engine.admission();
    admission
        .admit(pool.id(), AccountId::new(), Tranche::Priority, dec!(800_000), dec!(10), 30)
        .expect("priority ticket fits");
    admission
        .admit(pool.id(), AccountId::new(), Tranche::Catalyst, dec!(200_000), dec!(15), 30)
        .expect("catalyst ticket fits");
    engine.lifecycle().disburse(pool.id()).expect("pool is filled");
    (engine, pool.id())
}

fn settle(title: &str, surplus_policy: SurplusPolicy, policy: SettlementPolicy, gross: Decimal) {
    println!("━━━ {title} ━━━\n");
    let (engine, pool_id) = funded_engine(surplus_policy);
    let report = engine
        .settlement()
        .settle(policy, pool_id, gross)
        .expect("disbursed pool settles");
    println!("{report}");
    println!(
        "Conserved: {}   Invoice outcome: {}\n",
        report.is_conserved(),
        report.invoice_outcome
    );
}

fn main() {
    println!("╔══════════════════════════════════════════╗");
    println!("║  tranche-pool: Waterfall Settlement      ║");
    println!("╚══════════════════════════════════════════╝\n");

    println!("Pool: 1,000,000 IDR, 80% Priority at 10% p.a., 20% Catalyst at 15% p.a., 30 days");
    println!("Buyer repays 1,050,000 IDR; the platform keeps 2%.\n");

    settle(
        "Scenario 1: Pro-rata by principal",
        SurplusPolicy::ReturnToExporter,
        SettlementPolicy::ProRata,
        dec!(1_050_000),
    );
    settle(
        "Scenario 2: Priority first, surplus back to the exporter",
        SurplusPolicy::ReturnToExporter,
        SettlementPolicy::TranchePriority,
        dec!(1_050_000),
    );
    settle(
        "Scenario 3: Priority first, surplus as Catalyst bonus",
        SurplusPolicy::ProRataBonus,
        SettlementPolicy::TranchePriority,
        dec!(1_050_000),
    );
    settle(
        "Scenario 4: Partial repayment, Catalyst takes the first loss",
        SurplusPolicy::ReturnToExporter,
        SettlementPolicy::TranchePriority,
        dec!(900_000),
    );
}
