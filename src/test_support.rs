//! Scripted settlement backend and fixtures for reconciler tests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{AppError, AppResult, WalletError};
use crate::payment::models::{BackendType, Currency, Payment, PaymentStatus};
use crate::settlement::traits::{Observation, SettlementBackend, StatusCheck};
use crate::wallet::admin::{AdminWallet, WalletBalance};

/// One scripted answer
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Resolve(PaymentStatus),
    Pending,
    Fail,
    Panic,
}

#[derive(Debug, Clone, Copy)]
pub struct CallRecord {
    pub invoice: Uuid,
    pub started: Instant,
    pub finished: Instant,
}

/// Answers from a queue of steps, falling back to a fixed step once drained
pub struct ScriptedBackend {
    backend_type: BackendType,
    latency: Duration,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    overrides: Mutex<HashMap<Uuid, Step>>,
    calls: Mutex<Vec<CallRecord>>,
}

impl ScriptedBackend {
    pub fn new(backend_type: BackendType, fallback: Step) -> Self {
        Self {
            backend_type,
            latency: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            fallback,
            overrides: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn native() -> Arc<Self> {
        Arc::new(Self::new(
            BackendType::Native,
            Step::Resolve(PaymentStatus::Waiting),
        ))
    }

    pub fn provider() -> Arc<Self> {
        Arc::new(Self::new(
            BackendType::Provider,
            Step::Resolve(PaymentStatus::Waiting),
        ))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.lock().extend(steps);
        self
    }

    /// Always answer `step` for this invoice, ahead of the script
    pub fn override_invoice(&self, invoice: Uuid, step: Step) {
        self.overrides.lock().insert(invoice, step);
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl SettlementBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    fn supports(&self, _currency: Currency) -> bool {
        true
    }

    async fn check_payment(&self, payment: &Payment) -> AppResult<StatusCheck> {
        let started = Instant::now();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let overridden = self.overrides.lock().get(&payment.id).copied();
        let step = match overridden {
            Some(step) => step,
            None => self.script.lock().pop_front().unwrap_or(self.fallback),
        };
        self.calls.lock().push(CallRecord {
            invoice: payment.id,
            started,
            finished: Instant::now(),
        });

        match step {
            Step::Resolve(status) => Ok(StatusCheck::Resolved(Observation::status(status))),
            Step::Pending => Ok(StatusCheck::Indeterminate),
            Step::Fail => Err(AppError::Provider("scripted failure".to_string())),
            Step::Panic => panic!("scripted panic for {}", payment.id),
        }
    }
}

/// Invoice with a deterministic creation time, `offset_secs` after a fixed epoch
pub fn payment_created_at(currency: Currency, backend_type: BackendType, offset_secs: i64) -> Payment {
    let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut payment = Payment::new(
        currency,
        backend_type,
        dec!(1),
        "deposit-address",
        "payout-address",
        Utc::now() + ChronoDuration::hours(1),
    );
    payment.created_at = epoch + ChronoDuration::seconds(offset_secs);
    payment.updated_at = payment.created_at;
    payment
}

/// Admin wallet that records sends instead of broadcasting them
pub struct RecordingWallet {
    currency: Currency,
    fail: bool,
    sent: Mutex<Vec<(String, Decimal)>>,
}

impl RecordingWallet {
    pub fn new(currency: Currency) -> Self {
        Self {
            currency,
            fail: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn sent(&self) -> Vec<(String, Decimal)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl AdminWallet for RecordingWallet {
    fn currency(&self) -> Currency {
        self.currency
    }

    fn public_key(&self) -> String {
        format!("admin-{}", self.currency.ticker().to_lowercase())
    }

    fn is_valid_address(&self, address: &str) -> bool {
        !address.is_empty()
    }

    async fn get_balance(&self) -> AppResult<WalletBalance> {
        Ok(WalletBalance {
            confirmed: dec!(100),
            unconfirmed: None,
        })
    }

    async fn send_transaction(&self, destination: &str, amount: Decimal) -> AppResult<String> {
        if self.fail {
            return Err(WalletError::Broadcast {
                currency: self.currency,
                message: "scripted broadcast failure".to_string(),
            }
            .into());
        }

        let mut sent = self.sent.lock();
        sent.push((destination.to_string(), amount));
        Ok(format!("tx-{}", sent.len()))
    }
}
