pub mod admission;
pub mod context;
pub mod ledger;
pub mod lifecycle;

pub use admission::{Admission, CatalystConsents, InvestRequest, InvestmentQuote};
pub use context::PoolTxn;
pub use ledger::{InvestmentLedger, PortfolioSummary};
pub use lifecycle::{InvestorBreakdown, PaymentNotice, PoolBreakdown, PoolLifecycle};
