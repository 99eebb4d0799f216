use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::error::AppResult;
use crate::payment::models::Currency;
use crate::reconciler::governor::GovernorConfig;
use crate::reconciler::scheduler::SchedulerConfig;
use crate::settlement::{polygon, solana};

/// Runtime settings, read from the environment (and `.env`)
///
/// Durations are in milliseconds.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_settings"))]
pub struct Settings {
    #[validate(range(min = 1))]
    pub transaction_min_refresh_time: u64,
    #[validate(range(min = 1))]
    pub transaction_retry_delay: u64,
    #[validate(range(min = 1))]
    pub transaction_timeout: u64,

    pub testnets: bool,

    #[validate(url)]
    pub solana_rpc_url: Option<String>,
    #[validate(url)]
    pub polygon_rpc_url: Option<String>,

    #[validate(url)]
    pub blockbook_url_btc: Option<String>,
    #[validate(url)]
    pub blockbook_url_ltc: Option<String>,
    #[validate(url)]
    pub blockbook_url_dash: Option<String>,
    #[validate(url)]
    pub blockbook_url_doge: Option<String>,

    #[validate(range(min = 1, max = 1000))]
    pub provider_requests_per_second: u32,

    pub solana_admin_public_key: Option<String>,
    pub solana_admin_private_key: Option<String>,
}

fn validate_settings(settings: &Settings) -> Result<(), ValidationError> {
    if settings.transaction_timeout <= settings.transaction_retry_delay {
        let mut error = ValidationError::new("timeout_not_above_retry_delay");
        error.message = Some("TRANSACTION_TIMEOUT must exceed TRANSACTION_RETRY_DELAY".into());
        return Err(error);
    }

    if settings.solana_admin_public_key.is_some() != settings.solana_admin_private_key.is_some() {
        let mut error = ValidationError::new("incomplete_admin_wallet");
        error.message = Some(
            "SOLANA_ADMIN_PUBLIC_KEY and SOLANA_ADMIN_PRIVATE_KEY must be set together".into(),
        );
        return Err(error);
    }

    Ok(())
}

impl Settings {
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();
        Self::load(config::Environment::default())
    }

    pub(crate) fn load(environment: config::Environment) -> AppResult<Self> {
        let settings: Settings = config::Config::builder()
            .set_default("transaction_min_refresh_time", 30_000)?
            .set_default("transaction_retry_delay", 5_000)?
            .set_default("transaction_timeout", 60_000)?
            .set_default("testnets", false)?
            .set_default("provider_requests_per_second", 5)?
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn min_batch_period(&self) -> Duration {
        Duration::from_millis(self.transaction_min_refresh_time)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.transaction_retry_delay)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            min_batch_period: self.min_batch_period(),
            governor: GovernorConfig {
                deadline: self.check_timeout(),
                retry_delay: self.retry_delay(),
            },
        }
    }

    pub fn solana_rpc_url(&self) -> String {
        self.solana_rpc_url
            .clone()
            .unwrap_or_else(|| solana::cluster_url(self.testnets).to_string())
    }

    pub fn polygon_rpc_url(&self) -> String {
        self.polygon_rpc_url
            .clone()
            .unwrap_or_else(|| polygon::rpc_url(self.testnets).to_string())
    }

    /// Blockbook base URL for every provider currency that has one configured
    pub fn blockbook_endpoints(&self) -> HashMap<Currency, String> {
        [
            (Currency::Btc, &self.blockbook_url_btc),
            (Currency::Ltc, &self.blockbook_url_ltc),
            (Currency::Dash, &self.blockbook_url_dash),
            (Currency::Doge, &self.blockbook_url_doge),
        ]
        .into_iter()
        .filter_map(|(currency, url)| url.clone().map(|url| (currency, url)))
        .collect()
    }

    /// (public key, secret key) of the Solana payout wallet
    pub fn solana_admin_keys(&self) -> Option<(&str, &str)> {
        match (&self.solana_admin_public_key, &self.solana_admin_private_key) {
            (Some(public), Some(secret)) => Some((public.as_str(), secret.as_str())),
            _ => None,
        }
    }
}
