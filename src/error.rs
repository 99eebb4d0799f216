use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::payment::models::{Currency, PaymentStatus};

/// Top-level error type for the reconciler
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Status error: {0}")]
    Status(#[from] StatusError),

    #[error("Unsupported backend for {currency}: {reason}")]
    Unsupported { currency: Currency, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures surfaced by the check governor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("Status check for {invoice} timed out after {after:?}")]
    Timeout { invoice: Uuid, after: Duration },
}

/// Status model violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
}

/// Admin wallet errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Invalid destination address: {0}")]
    InvalidDestination(String),

    #[error("Broadcast failed on {currency}: {message}")]
    Broadcast { currency: Currency, message: String },

    #[error("Balance lookup failed on {currency}: {message}")]
    Balance { currency: Currency, message: String },

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::Provider(format!("HTTP request error: {:?}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Provider(format!("Malformed provider response: {}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(error: validator::ValidationErrors) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::Provider(format!("Decimal conversion error: {:?}", error))
    }
}

/// Result type alias for the reconciler
pub type AppResult<T> = Result<T, AppError>;
