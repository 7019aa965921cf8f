use crate::core::currency::CurrencyCode;
use crate::core::ids::{AccountId, InvoiceId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of entry written to the platform transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Investment,
    AdvancePayment,
    BuyerRepayment,
    InvestorReturn,
    PlatformFee,
    Refund,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionKind::Investment => "investment",
            TransactionKind::AdvancePayment => "advance_payment",
            TransactionKind::BuyerRepayment => "buyer_repayment",
            TransactionKind::InvestorReturn => "investor_return",
            TransactionKind::PlatformFee => "platform_fee",
            TransactionKind::Refund => "refund",
        };
        f.pad(s)
    }
}

/// Audit record emitted for every money movement the core decides on.
///
/// The core only produces these; storage belongs to the transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub invoice_id: InvoiceId,
    /// Investor or exporter the money moves to or from, if any.
    pub account_id: Option<AccountId>,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        kind: TransactionKind,
        invoice_id: InvoiceId,
        account_id: Option<AccountId>,
        amount: Decimal,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            invoice_id,
            account_id,
            amount,
            currency,
            note: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Invoice states the core reports to the invoice service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Funding,
    Funded,
    Repaid,
    Defaulted,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceStatus::Funding => "funding",
            InvoiceStatus::Funded => "funded",
            InvoiceStatus::Repaid => "repaid",
            InvoiceStatus::Defaulted => "defaulted",
        };
        f.pad(s)
    }
}
