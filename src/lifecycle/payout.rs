// Payout worker - forwards confirmed deposits to the merchant
//
// Flow per invoice:
// 1. CONFIRMED is observed on the status event stream
// 2. Invoice moves to SENDING (only one worker can win this step)
// 3. amount_paid is sent to the payout address from the admin wallet
// 4. FINISHED with the transaction id, or FAILED

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, WalletError};
use crate::payment::models::{Payment, PaymentStatus};
use crate::payment::registry::{ActivePayment, ActivePayments, StatusChange, StatusUpdate};
use crate::wallet::admin::{AdminWallet, AdminWallets};

/// What happened to one payout attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutOutcome {
    Sent { transaction: String },
    /// No admin wallet for the currency, invoice left CONFIRMED
    NoWallet,
    /// Another payout already claimed the invoice
    AlreadyClaimed,
    Failed { reason: String },
}

pub struct PayoutWorker {
    registry: Arc<ActivePayments>,
    wallets: AdminWallets,
}

impl PayoutWorker {
    pub fn new(registry: Arc<ActivePayments>, wallets: AdminWallets) -> Self {
        Self { registry, wallets }
    }

    /// Subscribe to status changes and pay out in the background
    ///
    /// The subscription is taken before this returns, so no CONFIRMED event
    /// emitted afterwards is missed.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let events = self.registry.subscribe();

        if self.wallets.is_empty() {
            warn!("⚠️ No admin wallets configured, confirmed invoices will not be paid out");
        } else {
            info!("💸 Payout worker started for {:?}", self.wallets.currencies());
        }

        // Confirmed before the subscription existed
        self.sweep_confirmed();

        tokio::spawn(async move { self.run(events).await })
    }

    async fn run(self: Arc<Self>, mut events: broadcast::Receiver<StatusChange>) {
        loop {
            match events.recv().await {
                Ok(change) if change.to == PaymentStatus::Confirmed => {
                    self.spawn_payout(change.invoice);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!("Payout worker missed {} status events, sweeping", missed);
                    self.sweep_confirmed();
                }
                Err(RecvError::Closed) => {
                    info!("✓ Payout worker stopped");
                    return;
                }
            }
        }
    }

    fn spawn_payout(self: &Arc<Self>, invoice: Uuid) {
        let worker = self.clone();
        tokio::spawn(async move {
            if let Some(entry) = worker.registry.get(&invoice) {
                worker.pay_out(&entry).await;
            }
        });
    }

    /// Pick up every invoice sitting in CONFIRMED
    pub fn sweep_confirmed(self: &Arc<Self>) {
        for entry in self.registry.snapshot() {
            if entry.status() == PaymentStatus::Confirmed {
                self.spawn_payout(entry.id());
            }
        }
    }

    /// Forward the received funds of one CONFIRMED invoice
    pub async fn pay_out(&self, entry: &ActivePayment) -> PayoutOutcome {
        let payment = entry.payment();

        let wallet = match self.wallets.get(payment.currency) {
            Some(wallet) => wallet,
            None => {
                warn!(
                    "⚠️ No {} admin wallet, invoice {} stays CONFIRMED",
                    payment.currency, payment.id
                );
                return PayoutOutcome::NoWallet;
            }
        };

        match entry.apply_status(PaymentStatus::Sending) {
            Ok(StatusUpdate::Changed { .. }) => {}
            Ok(StatusUpdate::Unchanged) | Err(_) => return PayoutOutcome::AlreadyClaimed,
        }

        let result = self.send(wallet.as_ref(), &payment).await;

        match result {
            Ok(transaction) => {
                info!(
                    "✓ Paid out {} {} for invoice {} (tx: {})",
                    payment.amount_paid, payment.currency, payment.id, transaction
                );
                entry.record_payout(transaction.clone());
                self.finish(entry, PaymentStatus::Finished);
                PayoutOutcome::Sent { transaction }
            }
            Err(e) => {
                error!("Payout for invoice {} failed: {}", payment.id, e);
                self.finish(entry, PaymentStatus::Failed);
                PayoutOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn send(&self, wallet: &dyn AdminWallet, payment: &Payment) -> AppResult<String> {
        if !wallet.is_valid_address(&payment.payout_address) {
            return Err(WalletError::InvalidDestination(payment.payout_address.clone()).into());
        }
        if payment.amount_paid <= Decimal::ZERO {
            return Err(AppError::Internal(format!(
                "Nothing received on invoice {}",
                payment.id
            )));
        }

        wallet
            .send_transaction(&payment.payout_address, payment.amount_paid)
            .await
    }

    fn finish(&self, entry: &ActivePayment, status: PaymentStatus) {
        if let Err(e) = entry.apply_status(status) {
            error!("Could not close invoice {}: {}", entry.id(), e);
        }
    }
}
