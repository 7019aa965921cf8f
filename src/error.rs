//! Crate-wide error types.

use crate::core::ids::{InvestmentId, InvoiceId, PoolId};
use crate::core::investment::InvestmentStatus;
use crate::core::pool::PoolStatus;
use crate::core::tranche::Tranche;
use crate::store::StoreError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Coarse class of a [`FundingError`], used by the request layer to pick
/// a response code and decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    ExceedsCapacity,
    InvalidInput,
    AlreadySettled,
    Unavailable,
}

#[derive(Debug, Error)]
pub enum FundingError {
    #[error("pool {0} not found")]
    PoolNotFound(PoolId),

    #[error("no pool exists for invoice {0}")]
    PoolNotFoundForInvoice(InvoiceId),

    #[error("investment {0} not found")]
    InvestmentNotFound(InvestmentId),

    #[error("a funding pool already exists for invoice {0}")]
    DuplicatePool(InvoiceId),

    #[error("tranche ratios {priority} + {catalyst} must sum to 1 (±0.1%)")]
    InvalidRatio { priority: Decimal, catalyst: Decimal },

    #[error("invalid amount {amount}: {reason}")]
    AmountMismatch { amount: Decimal, reason: String },

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("{tranche} investments require acceptance of {missing}")]
    ConsentRequired { tranche: Tranche, missing: String },

    #[error("pool {pool} is {status}, not open for investment")]
    PoolNotOpen { pool: PoolId, status: PoolStatus },

    #[error("cannot {operation} pool {pool} while it is {status}")]
    InvalidState {
        pool: PoolId,
        status: PoolStatus,
        operation: &'static str,
    },

    #[error("{tranche} tranche has {remaining} remaining, cannot admit {requested}")]
    ExceedsCapacity {
        tranche: Tranche,
        requested: Decimal,
        remaining: Decimal,
    },

    #[error("pool {0} has no investments to settle")]
    InvestmentSetEmpty(PoolId),

    #[error("pool {0} has already been settled")]
    PoolAlreadySettled(PoolId),

    #[error("investment {id} is already {status}")]
    InvestmentAlreadySettled {
        id: InvestmentId,
        status: InvestmentStatus,
    },

    #[error("pool {0} is already closed")]
    AlreadyClosed(PoolId),

    #[error("pool {pool} failed its invariant check: {detail}")]
    InvariantViolation { pool: PoolId, detail: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FundingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FundingError::PoolNotFound(_)
            | FundingError::PoolNotFoundForInvoice(_)
            | FundingError::InvestmentNotFound(_) => ErrorKind::NotFound,
            FundingError::DuplicatePool(_)
            | FundingError::PoolNotOpen { .. }
            | FundingError::InvalidState { .. }
            | FundingError::InvestmentSetEmpty(_)
            | FundingError::InvariantViolation { .. } => ErrorKind::InvalidState,
            FundingError::ExceedsCapacity { .. } => ErrorKind::ExceedsCapacity,
            FundingError::InvalidRatio { .. }
            | FundingError::AmountMismatch { .. }
            | FundingError::InvalidInput { .. }
            | FundingError::ConsentRequired { .. }
            | FundingError::Config(_) => ErrorKind::InvalidInput,
            FundingError::PoolAlreadySettled(_)
            | FundingError::InvestmentAlreadySettled { .. }
            | FundingError::AlreadyClosed(_) => ErrorKind::AlreadySettled,
            FundingError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// Only transient store failures may be retried without caller correction.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }

    /// Whether the caller is at fault (4xx-equivalent). Invariant violations
    /// are the engine's fault even though they are classed as a state error.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            FundingError::Unavailable(_) | FundingError::InvariantViolation { .. }
        )
    }

    pub(crate) fn amount(amount: Decimal, reason: impl Into<String>) -> Self {
        FundingError::AmountMismatch {
            amount,
            reason: reason.into(),
        }
    }

    pub(crate) fn input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FundingError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for FundingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PoolNotFound(id) => FundingError::PoolNotFound(id),
            StoreError::InvoiceNotFound(id) => FundingError::PoolNotFoundForInvoice(id),
            StoreError::InvestmentNotFound(id) => FundingError::InvestmentNotFound(id),
            StoreError::Duplicate(invoice) => FundingError::DuplicatePool(invoice),
            StoreError::Conflict { pool, .. } => {
                FundingError::Unavailable(format!("write conflict on pool {pool}"))
            }
            StoreError::Unavailable(msg) => FundingError::Unavailable(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, FundingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(FundingError::Unavailable("timeout".into()).is_retryable());
        assert!(!FundingError::PoolNotFound(PoolId::new()).is_retryable());
        assert!(!FundingError::ExceedsCapacity {
            tranche: Tranche::Catalyst,
            requested: dec!(10),
            remaining: dec!(5),
        }
        .is_retryable());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            FundingError::AlreadyClosed(PoolId::new()).kind(),
            ErrorKind::AlreadySettled
        );
        assert_eq!(
            FundingError::InvalidRatio {
                priority: dec!(0.5),
                catalyst: dec!(0.2)
            }
            .kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            FundingError::InvestmentNotFound(InvestmentId::new()).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_client_error_split() {
        assert!(FundingError::DuplicatePool(InvoiceId::new()).is_client_error());
        assert!(!FundingError::Unavailable("down".into()).is_client_error());
        assert!(!FundingError::InvariantViolation {
            pool: PoolId::new(),
            detail: "drift".into()
        }
        .is_client_error());
    }

    #[test]
    fn test_store_error_mapping() {
        let pool = PoolId::new();
        let err: FundingError = StoreError::PoolNotFound(pool).into();
        assert!(matches!(err, FundingError::PoolNotFound(p) if p == pool));
        let err: FundingError = StoreError::Unavailable("poisoned".into()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_messages_render() {
        let err = FundingError::ExceedsCapacity {
            tranche: Tranche::Priority,
            requested: dec!(900),
            remaining: dec!(800),
        };
        assert_eq!(
            err.to_string(),
            "priority tranche has 800 remaining, cannot admit 900"
        );
    }
}
