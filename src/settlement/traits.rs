use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};
use crate::payment::models::{BackendType, Currency, Payment, PaymentStatus};

/// What one status-check attempt learned about an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub status: PaymentStatus,
    /// Total received so far, when the backend could see it
    pub amount_paid: Option<Decimal>,
}

impl Observation {
    pub fn status(status: PaymentStatus) -> Self {
        Self {
            status,
            amount_paid: None,
        }
    }
}

/// Outcome of a single status-check attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCheck {
    /// The chain gave a conclusive answer this attempt
    Resolved(Observation),
    /// Nothing conclusive yet, try again
    Indeterminate,
}

/// Deposit address balance as seen by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainBalance {
    pub confirmed: Decimal,
    pub unconfirmed: Decimal,
}

impl ChainBalance {
    pub fn total(&self) -> Decimal {
        self.confirmed + self.unconfirmed
    }
}

/// Settlement backend - implemented once per currency or provider
///
/// A backend performs exactly one attempt per call. Retrying, deadlines and
/// status persistence belong to the reconciler.
#[async_trait]
pub trait SettlementBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn backend_type(&self) -> BackendType;

    /// Whether this backend can watch invoices in `currency`
    fn supports(&self, currency: Currency) -> bool;

    /// Look up the invoice's deposit address once and report what it shows
    ///
    /// Provider or network failures are returned as errors; the caller treats
    /// them the same as `StatusCheck::Indeterminate`.
    async fn check_payment(&self, payment: &Payment) -> AppResult<StatusCheck>;
}

/// Map an observed balance onto the status lifecycle
pub fn derive_status(payment: &Payment, balance: ChainBalance, now: DateTime<Utc>) -> Observation {
    let total = balance.total();

    let status = if balance.confirmed >= payment.amount {
        PaymentStatus::Confirmed
    } else if total >= payment.amount {
        PaymentStatus::Confirming
    } else if total > Decimal::ZERO {
        PaymentStatus::PartiallyPaid
    } else if payment.is_expired_at(now) {
        PaymentStatus::Expired
    } else {
        PaymentStatus::Waiting
    };

    // Unconfirmed funds are never paid out
    let amount_paid = if status == PaymentStatus::Confirmed {
        balance.confirmed
    } else {
        total
    };

    Observation {
        status,
        amount_paid: Some(amount_paid),
    }
}

/// Convert an integer amount of smallest units (lamports, wei, satoshis) to a decimal amount
pub fn from_base_units(units: u128, decimals: u32) -> AppResult<Decimal> {
    let units = i128::try_from(units)
        .map_err(|_| AppError::Provider(format!("Balance out of range: {}", units)))?;

    Ok(Decimal::try_from_i128_with_scale(units, decimals)?.normalize())
}
