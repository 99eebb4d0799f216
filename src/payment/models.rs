use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Payment status lifecycle
///
/// WAITING -> PARTIALLY_PAID -> CONFIRMING -> CONFIRMED -> SENDING -> FINISHED,
/// with FAILED and EXPIRED as escapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Waiting,
    PartiallyPaid,
    Confirming,
    Confirmed,
    Sending,
    Finished,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Waiting => "WAITING",
            PaymentStatus::PartiallyPaid => "PARTIALLY_PAID",
            PaymentStatus::Confirming => "CONFIRMING",
            PaymentStatus::Confirmed => "CONFIRMED",
            PaymentStatus::Sending => "SENDING",
            PaymentStatus::Finished => "FINISHED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Expired => "EXPIRED",
        }
    }

    /// Position along the forward lifecycle. `None` for the escape states.
    pub fn rank(&self) -> Option<u8> {
        match self {
            PaymentStatus::Waiting => Some(0),
            PaymentStatus::PartiallyPaid => Some(1),
            PaymentStatus::Confirming => Some(2),
            PaymentStatus::Confirmed => Some(3),
            PaymentStatus::Sending => Some(4),
            PaymentStatus::Finished => Some(5),
            PaymentStatus::Failed | PaymentStatus::Expired => None,
        }
    }

    /// No further on-chain improvement is expected; the reconciler stops polling.
    pub fn is_terminal(&self) -> bool {
        !self.is_polling()
    }

    /// States the reconciler keeps polling.
    pub fn is_polling(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Waiting | PaymentStatus::PartiallyPaid | PaymentStatus::Confirming
        )
    }

    /// Nothing leaves these states.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Finished | PaymentStatus::Failed | PaymentStatus::Expired
        )
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        if *self == next || self.is_final() {
            return false;
        }

        match next {
            PaymentStatus::Failed => true,
            PaymentStatus::Expired => self.is_polling(),
            _ => match (self.rank(), next.rank()) {
                (Some(current), Some(next)) => next > current,
                _ => false,
            },
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supported currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Sol,
    Matic,
    Btc,
    Ltc,
    Dash,
    Doge,
}

impl Currency {
    pub fn ticker(&self) -> &'static str {
        match self {
            Currency::Sol => "SOL",
            Currency::Matic => "MATIC",
            Currency::Btc => "BTC",
            Currency::Ltc => "LTC",
            Currency::Dash => "DASH",
            Currency::Doge => "DOGE",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Currency::Sol => "Solana",
            Currency::Matic => "Polygon",
            Currency::Btc => "Bitcoin",
            Currency::Ltc => "Litecoin",
            Currency::Dash => "Dash",
            Currency::Doge => "Dogecoin",
        }
    }

    /// Smallest-unit precision
    pub fn decimals(&self) -> u32 {
        match self {
            Currency::Sol => 9,
            Currency::Matic => 18,
            Currency::Btc | Currency::Ltc | Currency::Dash | Currency::Doge => 8,
        }
    }

    /// Whether a direct chain RPC backend exists for this currency
    pub fn has_native_backend(&self) -> bool {
        matches!(self, Currency::Sol | Currency::Matic)
    }

    pub fn all() -> Vec<Currency> {
        vec![
            Currency::Sol,
            Currency::Matic,
            Currency::Btc,
            Currency::Ltc,
            Currency::Dash,
            Currency::Doge,
        ]
    }

    pub fn from_ticker(ticker: &str) -> Option<Currency> {
        Currency::all()
            .into_iter()
            .find(|c| c.ticker().eq_ignore_ascii_case(ticker))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ticker())
    }
}

/// Settlement backend category of an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Direct chain RPC, one cohort per currency
    Native,
    /// Shared third-party chain-data provider, one cohort for all its currencies
    Provider,
}

/// Cohort assignment. Total over every (BackendType, Currency) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CohortKey {
    Native(Currency),
    Provider,
}

impl CohortKey {
    pub fn for_payment(backend_type: BackendType, currency: Currency) -> Self {
        match backend_type {
            BackendType::Native => CohortKey::Native(currency),
            BackendType::Provider => CohortKey::Provider,
        }
    }
}

impl fmt::Display for CohortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CohortKey::Native(currency) => write!(f, "native:{}", currency),
            CohortKey::Provider => write!(f, "provider"),
        }
    }
}

/// Identity of a tracked invoice, enough to assign it to a cohort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentIdentity {
    pub id: Uuid,
    pub backend_type: BackendType,
    pub currency: Currency,
}

impl PaymentIdentity {
    pub fn cohort_key(&self) -> CohortKey {
        CohortKey::for_payment(self.backend_type, self.currency)
    }
}

/// Invoice entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub currency: Currency,
    pub backend_type: BackendType,
    pub status: PaymentStatus,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount_paid: Decimal,

    /// Address the payer sends funds to
    pub deposit_address: String,
    /// Merchant address funds are forwarded to once confirmed
    pub payout_address: String,
    pub ipn_callback_url: Option<String>,
    pub payout_transaction: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        currency: Currency,
        backend_type: BackendType,
        amount: Decimal,
        deposit_address: impl Into<String>,
        payout_address: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            currency,
            backend_type,
            status: PaymentStatus::Waiting,
            amount,
            amount_paid: Decimal::ZERO,
            deposit_address: deposit_address.into(),
            payout_address: payout_address.into(),
            ipn_callback_url: None,
            payout_transaction: None,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.ipn_callback_url = Some(url.into());
        self
    }

    pub fn identity(&self) -> PaymentIdentity {
        PaymentIdentity {
            id: self.id,
            backend_type: self.backend_type,
            currency: self.currency,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn remaining(&self) -> Decimal {
        (self.amount - self.amount_paid).max(Decimal::ZERO)
    }
}

/// Public view of an invoice, safe to hand to the payer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceView {
    pub id: Uuid,
    pub currency: Currency,
    pub status: PaymentStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_paid: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining: Decimal,
    pub deposit_address: String,
    pub expires_at: DateTime<Utc>,
    pub invoice_callback_url: Option<String>,
}

impl InvoiceView {
    /// Where the payer is sent once the invoice stops progressing
    pub fn callback_redirect(&self) -> Option<String> {
        if !self.status.is_terminal() {
            return None;
        }

        self.invoice_callback_url.as_ref().map(|url| {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!(
                "{}{}status={}&invoice_id={}",
                url, separator, self.status, self.id
            )
        })
    }
}

impl From<&Payment> for InvoiceView {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            currency: payment.currency,
            status: payment.status,
            amount: payment.amount,
            amount_paid: payment.amount_paid,
            remaining: payment.remaining(),
            deposit_address: payment.deposit_address.clone(),
            expires_at: payment.expires_at,
            invoice_callback_url: payment.ipn_callback_url.clone(),
        }
    }
}
