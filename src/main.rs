//! tranche-pool CLI
//!
//! Run a funding-and-settlement scenario from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Fund a pool from a JSON scenario and settle it senior-first
//! tranche-pool settle --input scenario.json
//!
//! # Pro-rata settlement, JSON output
//! tranche-pool settle --input scenario.json --policy pro_rata --format json
//!
//! # Race random investors into a pool
//! tranche-pool simulate --orders 500 --threads 8
//! ```

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs;
use std::process;
use std::sync::Arc;
use tranche_pool::config::{EngineConfig, SurplusPolicy};
use tranche_pool::core::currency::CurrencyCode;
use tranche_pool::core::ids::{AccountId, InvoiceId};
use tranche_pool::core::pool::PoolTerms;
use tranche_pool::core::tranche::Tranche;
use tranche_pool::engine::FundingEngine;
use tranche_pool::events::RecordingListener;
use tranche_pool::settlement::{SettlementPolicy, SettlementReport};
use tranche_pool::simulation::stress_test::{run_scenario, FlowConfig, ScenarioConfig};
use tranche_pool::store::MemoryStore;

fn print_usage() {
    eprintln!(
        r#"tranche-pool: two-tranche invoice funding and settlement

USAGE:
    tranche-pool <COMMAND> [OPTIONS]

COMMANDS:
    settle      Fund a pool from a scenario file and settle it
    simulate    Race random investment orders into a pool, then settle it
    help        Show this message

OPTIONS (settle):
    --input <FILE>      Path to JSON scenario file
    --policy <POLICY>   tranche_priority (default) or pro_rata
    --surplus <POLICY>  return_to_exporter, pro_rata_bonus or accrue_to_platform
    --config <FILE>     JSON engine configuration (default: environment)
    --format <FORMAT>   Output format: text (default) or json

OPTIONS (simulate):
    --target <AMOUNT>   Pool target amount (default: 1000000)
    --orders <N>        Number of orders (default: 200)
    --threads <N>       Concurrent submitters (default: 8)
    --repayment <RATIO> Repayment as a fraction of funded (default: 1.05)
    --policy <POLICY>   Settlement policy (default: tranche_priority)
    --format <FORMAT>   Output format: text (default) or json

ENVIRONMENT:
    RUST_LOG                  Log filter, e.g. info or tranche_pool=debug
    PLATFORM_FEE_PERCENTAGE   Overrides the 2% platform fee
    SURPLUS_POLICY            Overrides the surplus policy

EXAMPLES:
    tranche-pool settle --input scenario.json
    tranche-pool settle --input scenario.json --policy pro_rata --format json
    tranche-pool simulate --orders 500 --threads 16"#
    );
}

/// JSON schema for an input scenario.
#[derive(serde::Deserialize)]
struct ScenarioFile {
    target_amount: Decimal,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    priority_ratio: Option<Decimal>,
    #[serde(default)]
    catalyst_ratio: Option<Decimal>,
    #[serde(default)]
    priority_rate: Option<Decimal>,
    #[serde(default)]
    catalyst_rate: Option<Decimal>,
    /// Tenor applied to every investment; the configured default if absent.
    #[serde(default)]
    tenor_days: Option<i64>,
    investments: Vec<InvestmentInput>,
    gross_amount: Decimal,
}

#[derive(serde::Deserialize)]
struct InvestmentInput {
    investor: String,
    tranche: Tranche,
    amount: Decimal,
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    process::exit(1);
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str, hint: &str) -> &'a str {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .unwrap_or_else(|| fail(format!("{flag} requires {hint}")))
}

fn load_config(path: Option<&str>) -> EngineConfig {
    let result = match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .unwrap_or_else(|e| fail(format!("reading config '{path}': {e}")));
            EngineConfig::from_json(&content)
        }
        None => EngineConfig::from_env(),
    };
    result.unwrap_or_else(|e| fail(e))
}

fn load_scenario(path: &str) -> ScenarioFile {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("reading file '{path}': {e}")));
    serde_json::from_str(&content).unwrap_or_else(|e| {
        eprintln!("Error parsing JSON: {e}");
        eprintln!("Expected format:");
        eprintln!(
            r#"{{
  "target_amount": "1000000",
  "currency": "IDR",
  "tenor_days": 30,
  "investments": [
    {{ "investor": "alice", "tranche": "priority", "amount": "800000" }},
    {{ "investor": "bob", "tranche": "catalyst", "amount": "200000" }}
  ],
  "gross_amount": "1050000"
}}"#
        );
        process::exit(1);
    })
}

fn print_json<T: serde::Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|e| fail(e));
    println!("{json}");
}

fn cmd_settle(args: &[String]) {
    let mut input_path = None;
    let mut config_path = None;
    let mut policy = SettlementPolicy::TranchePriority;
    let mut surplus: Option<SurplusPolicy> = None;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => input_path = Some(next_value(args, &mut i, "--input", "a file path").to_string()),
            "--config" => config_path = Some(next_value(args, &mut i, "--config", "a file path").to_string()),
            "--policy" => {
                policy = next_value(args, &mut i, "--policy", "a settlement policy")
                    .parse()
                    .unwrap_or_else(|e| fail(e));
            }
            "--surplus" => {
                surplus = Some(
                    next_value(args, &mut i, "--surplus", "a surplus policy")
                        .parse()
                        .unwrap_or_else(|e| fail(e)),
                );
            }
            "--format" => format = next_value(args, &mut i, "--format", "'text' or 'json'").to_string(),
            other => fail(format!("unknown option: {other}")),
        }
        i += 1;
    }

    let path = input_path.unwrap_or_else(|| fail("--input <FILE> is required"));
    let scenario = load_scenario(&path);
    let mut config = load_config(config_path.as_deref());
    if let Some(surplus) = surplus {
        config.surplus_policy = surplus;
    }

    let listener = Arc::new(RecordingListener::new());
    let engine = FundingEngine::new(Arc::new(MemoryStore::new()), config, listener.clone())
        .unwrap_or_else(|e| fail(e));
    let (report, names) = fund_and_settle(&engine, &scenario, policy);

    if format == "json" {
        #[derive(serde::Serialize)]
        struct SettleOutput<'a> {
            report: &'a SettlementReport,
            investors: &'a HashMap<AccountId, String>,
            transactions: Vec<tranche_pool::core::transaction::TransactionRecord>,
        }
        print_json(&SettleOutput {
            report: &report,
            investors: &names,
            transactions: listener.transactions(),
        });
    } else {
        println!("{report}");
        println!("Investors:");
        for payout in &report.payouts {
            let name = names.get(&payout.investor_id).map_or("?", String::as_str);
            println!("  {:<12} {}", name, payout.investment_id);
        }
        println!();
        println!("Transaction log:");
        for record in listener.transactions() {
            println!(
                "  {:<16} {:>16} {}",
                record.kind.to_string(),
                record.amount.to_string(),
                record.currency
            );
        }
    }
}

/// Open the scenario's pool, admit its investments, move it out of
/// funding and settle it.
fn fund_and_settle(
    engine: &FundingEngine,
    scenario: &ScenarioFile,
    policy: SettlementPolicy,
) -> (SettlementReport, HashMap<AccountId, String>) {
    let config = engine.config();
    let mut terms: PoolTerms = config.pool_terms(InvoiceId::new(), scenario.target_amount);
    if let Some(code) = &scenario.currency {
        terms.currency = CurrencyCode::new(code.as_str());
    }
    terms.priority_ratio = scenario.priority_ratio.unwrap_or(terms.priority_ratio);
    terms.catalyst_ratio = scenario.catalyst_ratio.unwrap_or(terms.catalyst_ratio);
    terms.priority_rate = scenario.priority_rate.unwrap_or(terms.priority_rate);
    terms.catalyst_rate = scenario.catalyst_rate.unwrap_or(terms.catalyst_rate);
    let tenor = scenario
        .tenor_days
        .unwrap_or_else(|| i64::from(config.default_tenor_days));

    let pool = engine.lifecycle().create_pool(terms).unwrap_or_else(|e| fail(e));

    let mut ids: HashMap<String, AccountId> = HashMap::new();
    for input in &scenario.investments {
        let investor = *ids.entry(input.investor.clone()).or_default();
        let rate = pool.tranche(input.tranche).interest_rate;
        engine
            .admission()
            .admit(pool.id(), investor, input.tranche, input.amount, rate, tenor)
            .unwrap_or_else(|e| fail(format!("investment by {}: {e}", input.investor)));
    }

    let lifecycle = engine.lifecycle();
    let funded = lifecycle.pool(pool.id()).unwrap_or_else(|e| fail(e));
    let moved = if funded.is_fully_funded() {
        lifecycle.disburse(pool.id()).map(|_| ())
    } else {
        lifecycle.close_early(pool.id()).map(|_| ())
    };
    moved.unwrap_or_else(|e| fail(e));

    let report = engine
        .settlement()
        .settle(policy, pool.id(), scenario.gross_amount)
        .unwrap_or_else(|e| fail(e));
    let names = ids.into_iter().map(|(name, id)| (id, name)).collect();
    (report, names)
}

fn cmd_simulate(args: &[String]) {
    let mut scenario = ScenarioConfig::default();
    let mut flow = FlowConfig::default();
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--target" => {
                scenario.target_amount = next_value(args, &mut i, "--target", "an amount")
                    .parse()
                    .unwrap_or_else(|e| fail(format!("invalid --target: {e}")));
            }
            "--orders" => {
                flow.order_count = next_value(args, &mut i, "--orders", "a number")
                    .parse()
                    .unwrap_or_else(|e| fail(format!("invalid --orders: {e}")));
            }
            "--threads" => {
                scenario.threads = next_value(args, &mut i, "--threads", "a number")
                    .parse()
                    .unwrap_or_else(|e| fail(format!("invalid --threads: {e}")));
            }
            "--repayment" => {
                scenario.repayment_ratio = next_value(args, &mut i, "--repayment", "a ratio")
                    .parse()
                    .unwrap_or_else(|e| fail(format!("invalid --repayment: {e}")));
            }
            "--policy" => {
                scenario.policy = next_value(args, &mut i, "--policy", "a settlement policy")
                    .parse()
                    .unwrap_or_else(|e| fail(e));
            }
            "--format" => format = next_value(args, &mut i, "--format", "'text' or 'json'").to_string(),
            other => fail(format!("unknown option: {other}")),
        }
        i += 1;
    }

    let config = load_config(None);
    flow.currency = config.default_currency.clone();
    scenario.flow = flow;
    let engine = FundingEngine::in_memory(config).unwrap_or_else(|e| fail(e));
    let result = run_scenario(&engine, &scenario).unwrap_or_else(|e| fail(e));

    if format == "json" {
        print_json(&result);
        return;
    }

    let a = &result.admission;
    println!("=== Concurrent Admission ===");
    println!("Orders:            {}", a.total_orders());
    println!("Admitted:          {} ({})", a.admitted, a.admitted_amount);
    println!("Over capacity:     {}", a.rejected_capacity);
    println!("Pool not open:     {}", a.rejected_state);
    println!("Unavailable:       {}", a.unavailable);
    println!("Funded:            {} / {}", a.funded_amount, a.target_amount);
    println!("Invariants hold:   {}", a.invariants_hold);
    println!("Elapsed:           {:?}", a.elapsed);
    println!();
    match &result.settlement {
        Some(report) => println!("{report}"),
        None => println!("Nothing admitted; no settlement."),
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    match args[1].as_str() {
        "settle" => cmd_settle(&args[2..]),
        "simulate" => cmd_simulate(&args[2..]),
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
}
