use async_trait::async_trait;
use chrono::Utc;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::payment::models::{BackendType, Currency, Payment};
use crate::settlement::traits::{
    derive_status, from_base_units, ChainBalance, SettlementBackend, StatusCheck,
};

pub const SOLANA_MAINNET_URL: &str = "https://api.mainnet-beta.solana.com";
pub const SOLANA_DEVNET_URL: &str = "https://api.devnet.solana.com";

/// Cluster URL for the configured network
pub fn cluster_url(testnets: bool) -> &'static str {
    if testnets {
        SOLANA_DEVNET_URL
    } else {
        SOLANA_MAINNET_URL
    }
}

/// Watches SOL deposit addresses directly over Solana JSON-RPC
///
/// Funds visible at `confirmed` commitment count as confirmed. Anything only
/// visible at `processed` counts as unconfirmed.
pub struct SolanaBackend {
    client: RpcClient,
}

impl SolanaBackend {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url.into(), CommitmentConfig::confirmed()),
        }
    }

    async fn balance_at(&self, address: &Pubkey, commitment: CommitmentConfig) -> AppResult<u64> {
        let response = self
            .client
            .get_balance_with_commitment(address, commitment)
            .await
            .map_err(|e| AppError::Provider(format!("Solana getBalance failed: {}", e)))?;

        Ok(response.value)
    }
}

pub fn parse_address(address: &str) -> AppResult<Pubkey> {
    Pubkey::from_str(address)
        .map_err(|e| AppError::Provider(format!("Invalid Solana address {}: {}", address, e)))
}

#[async_trait]
impl SettlementBackend for SolanaBackend {
    fn name(&self) -> &'static str {
        "solana-rpc"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Native
    }

    fn supports(&self, currency: Currency) -> bool {
        currency == Currency::Sol
    }

    async fn check_payment(&self, payment: &Payment) -> AppResult<StatusCheck> {
        let address = parse_address(&payment.deposit_address)?;

        let confirmed = self.balance_at(&address, CommitmentConfig::confirmed()).await?;
        let processed = self.balance_at(&address, CommitmentConfig::processed()).await?;

        debug!(
            "SOL deposit {}: {} confirmed, {} processed lamports",
            address, confirmed, processed
        );

        let balance = ChainBalance {
            confirmed: from_base_units(confirmed.into(), Currency::Sol.decimals())?,
            unconfirmed: from_base_units(
                processed.saturating_sub(confirmed).into(),
                Currency::Sol.decimals(),
            )?,
        };

        Ok(StatusCheck::Resolved(derive_status(payment, balance, Utc::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_url() {
        assert_eq!(cluster_url(true), SOLANA_DEVNET_URL);
        assert_eq!(cluster_url(false), SOLANA_MAINNET_URL);
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("11111111111111111111111111111111").is_ok());
        assert!(matches!(
            parse_address("not-a-key"),
            Err(AppError::Provider(_))
        ));
    }

    #[test]
    fn test_only_serves_sol() {
        let backend = SolanaBackend::new(SOLANA_DEVNET_URL);
        assert!(backend.supports(Currency::Sol));
        assert!(!backend.supports(Currency::Matic));
        assert_eq!(backend.backend_type(), BackendType::Native);
    }
}
