use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::spawn;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::payment::models::{Currency, Payment, PaymentStatus};
use crate::payment::registry::{ActivePayments, StatusChange};

/// IPN payload posted to the merchant on every status change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentWebhookPayload {
    pub invoice_id: Uuid,
    pub status: PaymentStatus,
    pub currency: Currency,
    pub amount: String,
    pub amount_paid: String,
    pub timestamp: i64,
}

impl PaymentWebhookPayload {
    pub fn new(payment: &Payment, change: &StatusChange) -> Self {
        Self {
            invoice_id: payment.id,
            status: change.to,
            currency: payment.currency,
            amount: payment.amount.to_string(),
            amount_paid: payment.amount_paid.to_string(),
            timestamp: change.at.timestamp(),
        }
    }
}

/// Merchant callback dispatcher
///
/// Deliveries run in their own tasks; a slow or failing merchant endpoint
/// never holds up the event stream.
pub struct WebhookNotifier {
    registry: Arc<ActivePayments>,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(registry: Arc<ActivePayments>) -> AppResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { registry, client })
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let mut events = self.registry.subscribe();
        info!("📨 Webhook notifier started");

        spawn(async move {
            loop {
                match events.recv().await {
                    Ok(change) => {
                        self.notify(&change);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Webhook notifier dropped {} status events", missed);
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        })
    }

    /// Queue a callback for this change, if the invoice has a callback URL
    pub fn notify(&self, change: &StatusChange) -> Option<JoinHandle<()>> {
        let payment = self.registry.get(&change.invoice)?.payment();
        let url = payment.ipn_callback_url.clone()?;
        let payload = PaymentWebhookPayload::new(&payment, change);
        let client = self.client.clone();

        Some(spawn(async move {
            if let Err(e) = Self::deliver(&client, &url, &payload).await {
                error!("Webhook delivery for {} failed: {}", payload.invoice_id, e);
            }
        }))
    }

    async fn deliver(client: &Client, url: &str, payload: &PaymentWebhookPayload) -> AppResult<()> {
        debug!(
            "Posting {} for invoice {} to {}",
            payload.status, payload.invoice_id, url
        );

        client
            .post(url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;

        info!("✓ Webhook delivered: invoice={} status={}", payload.invoice_id, payload.status);
        Ok(())
    }
}
