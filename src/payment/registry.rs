use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult, StatusError};
use crate::payment::models::{Currency, Payment, PaymentIdentity, PaymentStatus};
use crate::settlement::traits::{Observation, SettlementBackend, StatusCheck};

/// Emitted whenever a tracked invoice changes status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub invoice: Uuid,
    pub currency: Currency,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub at: DateTime<Utc>,
}

/// Result of applying a status report to an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Changed {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    Unchanged,
}

/// An invoice in the active set together with the backend that watches it
pub struct ActivePayment {
    payment: RwLock<Payment>,
    backend: Arc<dyn SettlementBackend>,
    events: broadcast::Sender<StatusChange>,
}

impl ActivePayment {
    pub fn identity(&self) -> PaymentIdentity {
        self.payment.read().identity()
    }

    pub fn id(&self) -> Uuid {
        self.payment.read().id
    }

    pub fn status(&self) -> PaymentStatus {
        self.payment.read().status
    }

    /// Point-in-time copy of the invoice
    pub fn payment(&self) -> Payment {
        self.payment.read().clone()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// One status-check attempt against the settlement backend
    pub async fn check(&self) -> AppResult<StatusCheck> {
        let payment = self.payment();
        self.backend.check_payment(&payment).await
    }

    /// Apply what a backend observed
    ///
    /// Status and amount are written together. A rejected transition leaves
    /// both untouched.
    pub fn apply_observation(&self, observation: Observation) -> Result<StatusUpdate, StatusError> {
        self.transition(observation.status, observation.amount_paid)
    }

    /// Move the invoice forward. Never demotes; a repeated status is a no-op.
    pub fn apply_status(&self, next: PaymentStatus) -> Result<StatusUpdate, StatusError> {
        self.transition(next, None)
    }

    fn transition(
        &self,
        next: PaymentStatus,
        amount_paid: Option<Decimal>,
    ) -> Result<StatusUpdate, StatusError> {
        let change = {
            let mut payment = self.payment.write();
            let current = payment.status;

            if current != next && !current.can_transition_to(next) {
                return Err(StatusError::IllegalTransition {
                    from: current,
                    to: next,
                });
            }

            if let Some(amount_paid) = amount_paid {
                Self::write_amount_paid(&mut payment, amount_paid);
            }

            if current == next {
                return Ok(StatusUpdate::Unchanged);
            }

            let now = Utc::now();
            payment.status = next;
            payment.updated_at = now;

            StatusChange {
                invoice: payment.id,
                currency: payment.currency,
                from: current,
                to: next,
                at: now,
            }
        };

        info!(
            "Invoice {} status {} -> {}",
            change.invoice, change.from, change.to
        );

        let update = StatusUpdate::Changed {
            from: change.from,
            to: change.to,
        };

        // No subscribers is fine
        let _ = self.events.send(change);

        Ok(update)
    }

    /// Only tracked while the invoice is still being polled
    pub fn record_amount_paid(&self, amount_paid: Decimal) {
        Self::write_amount_paid(&mut self.payment.write(), amount_paid);
    }

    fn write_amount_paid(payment: &mut Payment, amount_paid: Decimal) {
        if payment.status.is_polling() && payment.amount_paid != amount_paid {
            debug!(
                "Invoice {} amount paid {} -> {}",
                payment.id, payment.amount_paid, amount_paid
            );
            payment.amount_paid = amount_paid;
            payment.updated_at = Utc::now();
        }
    }

    pub fn record_payout(&self, transaction: String) {
        let mut payment = self.payment.write();
        payment.payout_transaction = Some(transaction);
        payment.updated_at = Utc::now();
    }
}

/// Active-invoice registry
///
/// Owned by whoever creates invoices. The reconciler only snapshots it and
/// writes status updates into entries that already exist.
pub struct ActivePayments {
    payments: RwLock<HashMap<Uuid, Arc<ActivePayment>>>,
    events: broadcast::Sender<StatusChange>,
}

impl ActivePayments {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            payments: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Start tracking an invoice with the backend that can watch it
    pub fn track(
        &self,
        payment: Payment,
        backend: Arc<dyn SettlementBackend>,
    ) -> AppResult<Arc<ActivePayment>> {
        if backend.backend_type() != payment.backend_type || !backend.supports(payment.currency) {
            return Err(AppError::Unsupported {
                currency: payment.currency,
                reason: format!(
                    "backend {} cannot watch {:?} invoices",
                    backend.name(),
                    payment.backend_type
                ),
            });
        }

        let id = payment.id;
        let entry = Arc::new(ActivePayment {
            payment: RwLock::new(payment),
            backend,
            events: self.events.clone(),
        });

        self.payments.write().insert(id, entry.clone());
        debug!("Tracking invoice {}", id);

        Ok(entry)
    }

    pub fn untrack(&self, id: &Uuid) -> Option<Arc<ActivePayment>> {
        let removed = self.payments.write().remove(id);
        if removed.is_some() {
            debug!("Stopped tracking invoice {}", id);
        }
        removed
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<ActivePayment>> {
        self.payments.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.payments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.read().is_empty()
    }

    /// Current active set, oldest invoice first
    pub fn snapshot(&self) -> Vec<Arc<ActivePayment>> {
        let mut entries: Vec<(DateTime<Utc>, Uuid, Arc<ActivePayment>)> = self
            .payments
            .read()
            .values()
            .map(|entry| {
                let payment = entry.payment.read();
                (payment.created_at, payment.id, entry.clone())
            })
            .collect();

        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        entries.into_iter().map(|(_, _, entry)| entry).collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.events.subscribe()
    }
}

impl Default for ActivePayments {
    fn default() -> Self {
        Self::new(1024)
    }
}
