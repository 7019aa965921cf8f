use crate::core::ids::InvoiceId;
use crate::core::transaction::{InvoiceStatus, TransactionRecord};
use std::sync::{Mutex, PoisonError};

/// Receiver of committed funding events.
///
/// Implementations must not block for long: delivery happens on the
/// request thread right after the commit.
pub trait FundingListener: Send + Sync {
    /// Append-only transaction log entry.
    fn on_transaction(&self, _record: &TransactionRecord) {}

    /// Invoice status change for the invoice service.
    fn on_invoice_status(&self, _invoice_id: InvoiceId, _status: InvoiceStatus) {}
}

/// Listener that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl FundingListener for NoopListener {}

/// Listener that keeps every event in memory, in delivery order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    transactions: Mutex<Vec<TransactionRecord>>,
    invoice_updates: Mutex<Vec<(InvoiceId, InvoiceStatus)>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn invoice_updates(&self) -> Vec<(InvoiceId, InvoiceStatus)> {
        self.invoice_updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent status reported for an invoice.
    pub fn invoice_status(&self, invoice_id: InvoiceId) -> Option<InvoiceStatus> {
        self.invoice_updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(id, _)| *id == invoice_id)
            .map(|(_, status)| *status)
    }
}

impl FundingListener for RecordingListener {
    fn on_transaction(&self, record: &TransactionRecord) {
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }

    fn on_invoice_status(&self, invoice_id: InvoiceId, status: InvoiceStatus) {
        self.invoice_updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((invoice_id, status));
    }
}

/// Events staged by a transaction, delivered after commit.
#[derive(Debug, Default, Clone)]
pub(crate) struct PendingEvents {
    pub transactions: Vec<TransactionRecord>,
    pub invoice_updates: Vec<(InvoiceId, InvoiceStatus)>,
}

impl PendingEvents {
    pub fn deliver(self, listener: &dyn FundingListener) {
        for record in &self.transactions {
            listener.on_transaction(record);
        }
        for (invoice_id, status) in self.invoice_updates {
            listener.on_invoice_status(invoice_id, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyCode;
    use crate::core::transaction::TransactionKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pending_events_delivered_in_order() {
        let listener = RecordingListener::new();
        let invoice = InvoiceId::new();
        let mut pending = PendingEvents::default();
        pending.transactions.push(TransactionRecord::new(
            TransactionKind::Investment,
            invoice,
            None,
            dec!(10),
            CurrencyCode::new("USD"),
        ));
        pending.invoice_updates.push((invoice, InvoiceStatus::Funding));
        pending.invoice_updates.push((invoice, InvoiceStatus::Funded));
        pending.deliver(&listener);

        assert_eq!(listener.transactions().len(), 1);
        assert_eq!(listener.invoice_updates().len(), 2);
        assert_eq!(listener.invoice_status(invoice), Some(InvoiceStatus::Funded));
    }

    #[test]
    fn test_noop_listener_accepts_events() {
        let mut pending = PendingEvents::default();
        pending.invoice_updates.push((InvoiceId::new(), InvoiceStatus::Repaid));
        pending.deliver(&NoopListener);
    }
}
