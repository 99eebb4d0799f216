use async_trait::async_trait;
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::payment::models::{BackendType, Currency, Payment};
use crate::settlement::traits::{
    derive_status, from_base_units, ChainBalance, SettlementBackend, StatusCheck,
};

/// Build the limiter shared by every provider request
pub fn provider_limiter(requests_per_second: u32) -> AppResult<Arc<DefaultDirectRateLimiter>> {
    let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| {
        AppError::Config("PROVIDER_REQUESTS_PER_SECOND must be at least 1".to_string())
    })?;

    Ok(Arc::new(RateLimiter::direct(Quota::per_second(rate))))
}

/// Address summary as returned by `/api/v2/address/{addr}?details=basic`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressInfo {
    #[serde(default)]
    balance: Option<String>,
    #[serde(default)]
    unconfirmed_balance: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Third-party Blockbook indexer serving UTXO currencies
///
/// One base URL per currency. Every request, across all currencies, first
/// waits on the shared rate limiter.
pub struct BlockbookBackend {
    client: Client,
    endpoints: HashMap<Currency, String>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl BlockbookBackend {
    pub fn new(
        endpoints: HashMap<Currency, String>,
        limiter: Arc<DefaultDirectRateLimiter>,
    ) -> AppResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(20)).build()?;

        for (currency, url) in &endpoints {
            info!("Blockbook endpoint for {}: {}", currency, url);
        }

        Ok(Self {
            client,
            endpoints,
            limiter,
        })
    }

    pub fn currencies(&self) -> Vec<Currency> {
        let mut currencies: Vec<Currency> = self.endpoints.keys().copied().collect();
        currencies.sort();
        currencies
    }

    fn address_url(&self, currency: Currency, address: &str) -> AppResult<String> {
        let base = self.endpoints.get(&currency).ok_or_else(|| AppError::Unsupported {
            currency,
            reason: "no Blockbook endpoint configured".to_string(),
        })?;

        Ok(address_url(base, address))
    }
}

fn address_url(base: &str, address: &str) -> String {
    format!(
        "{}/api/v2/address/{}?details=basic",
        base.trim_end_matches('/'),
        address
    )
}

/// Decode the satoshi strings of an address summary
fn parse_address_info(info: AddressInfo, decimals: u32) -> AppResult<ChainBalance> {
    if let Some(error) = info.error {
        return Err(AppError::Provider(format!("Blockbook error: {}", error)));
    }

    let confirmed = parse_units(info.balance.as_deref().unwrap_or("0"))?;
    let unconfirmed = parse_units(info.unconfirmed_balance.as_deref().unwrap_or("0"))?;

    // Outgoing mempool spends show up as a negative unconfirmed balance
    Ok(ChainBalance {
        confirmed: from_base_units(confirmed.max(0) as u128, decimals)?,
        unconfirmed: from_base_units(unconfirmed.max(0) as u128, decimals)?,
    })
}

fn parse_units(raw: &str) -> AppResult<i128> {
    raw.trim()
        .parse::<i128>()
        .map_err(|e| AppError::Provider(format!("Malformed Blockbook amount {}: {}", raw, e)))
}

#[async_trait]
impl SettlementBackend for BlockbookBackend {
    fn name(&self) -> &'static str {
        "blockbook"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Provider
    }

    fn supports(&self, currency: Currency) -> bool {
        self.endpoints.contains_key(&currency)
    }

    async fn check_payment(&self, payment: &Payment) -> AppResult<StatusCheck> {
        let url = self.address_url(payment.currency, &payment.deposit_address)?;

        self.limiter.until_ready().await;

        let info: AddressInfo = self.client.get(&url).send().await?.json().await?;
        let balance = parse_address_info(info, payment.currency.decimals())?;

        debug!(
            "{} deposit {}: {} confirmed, {} unconfirmed",
            payment.currency, payment.deposit_address, balance.confirmed, balance.unconfirmed
        );

        Ok(StatusCheck::Resolved(derive_status(payment, balance, Utc::now())))
    }
}
