use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::payment::models::{BackendType, Currency, Payment};
use crate::settlement::traits::{
    derive_status, from_base_units, ChainBalance, SettlementBackend, StatusCheck,
};

pub const POLYGON_MAINNET_URL: &str = "https://polygon-rpc.com";
pub const POLYGON_AMOY_URL: &str = "https://rpc-amoy.polygon.technology";

pub fn rpc_url(testnets: bool) -> &'static str {
    if testnets {
        POLYGON_AMOY_URL
    } else {
        POLYGON_MAINNET_URL
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: [&'a str; 2],
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Watches MATIC deposit addresses through `eth_getBalance`
///
/// The `latest` block balance is treated as confirmed, the `pending` block
/// adds whatever is still in the mempool.
pub struct PolygonBackend {
    client: Client,
    rpc_url: String,
}

impl PolygonBackend {
    pub fn new(rpc_url: impl Into<String>) -> AppResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(20)).build()?;

        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
        })
    }

    async fn balance_at(&self, address: &str, block: &str) -> AppResult<u128> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "eth_getBalance",
            params: [address, block],
        };

        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(AppError::Provider(format!(
                "eth_getBalance error {}: {}",
                error.code, error.message
            )));
        }

        let result = response
            .result
            .ok_or_else(|| AppError::Provider("eth_getBalance returned no result".to_string()))?;

        parse_quantity(&result)
    }
}

/// Parse a JSON-RPC hex quantity such as `0x1bc16d674ec80000`
pub fn parse_quantity(raw: &str) -> AppResult<u128> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| AppError::Provider(format!("Malformed quantity: {}", raw)))?;

    if digits.is_empty() {
        return Ok(0);
    }

    u128::from_str_radix(digits, 16)
        .map_err(|e| AppError::Provider(format!("Malformed quantity {}: {}", raw, e)))
}

/// 0x-prefixed, 20 byte hex address
pub fn is_valid_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

#[async_trait]
impl SettlementBackend for PolygonBackend {
    fn name(&self) -> &'static str {
        "polygon-rpc"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Native
    }

    fn supports(&self, currency: Currency) -> bool {
        currency == Currency::Matic
    }

    async fn check_payment(&self, payment: &Payment) -> AppResult<StatusCheck> {
        let address = payment.deposit_address.as_str();
        if !is_valid_address(address) {
            return Err(AppError::Provider(format!(
                "Invalid Polygon address: {}",
                address
            )));
        }

        let latest = self.balance_at(address, "latest").await?;
        let pending = self.balance_at(address, "pending").await?;

        debug!(
            "MATIC deposit {}: {} latest, {} pending wei",
            address, latest, pending
        );

        let decimals = Currency::Matic.decimals();
        let balance = ChainBalance {
            confirmed: from_base_units(latest, decimals)?,
            unconfirmed: from_base_units(pending.saturating_sub(latest), decimals)?,
        };

        Ok(StatusCheck::Resolved(derive_status(payment, balance, Utc::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(
            parse_quantity("0x1bc16d674ec80000").unwrap(),
            2_000_000_000_000_000_000
        );
        assert!(parse_quantity("1234").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("0x52908400098527886E0F7030069857D2E4169EE7"));
        assert!(!is_valid_address("52908400098527886E0F7030069857D2E4169EE7"));
        assert!(!is_valid_address("0x5290840009852788"));
        assert!(!is_valid_address("0xG2908400098527886E0F7030069857D2E4169EE7"));
    }

    #[test]
    fn test_rpc_response_shapes() {
        let ok: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":"0x2a"}"#).unwrap();
        assert_eq!(ok.result.as_deref(), Some("0x2a"));

        let failed: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"invalid argument"}}"#,
        )
        .unwrap();
        assert!(failed.result.is_none());
        assert_eq!(failed.error.unwrap().code, -32602);
    }

    #[test]
    fn test_rpc_url() {
        assert_eq!(rpc_url(true), POLYGON_AMOY_URL);
        assert_eq!(rpc_url(false), POLYGON_MAINNET_URL);
    }
}
