// Reactions to invoice status changes outside the reconciler
pub mod payout;
pub mod webhook;

pub use payout::{PayoutOutcome, PayoutWorker};
pub use webhook::{PaymentWebhookPayload, WebhookNotifier};
