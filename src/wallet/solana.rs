use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use std::str::FromStr;
use tracing::{error, info};

use crate::error::{AppResult, WalletError};
use crate::payment::models::Currency;
use crate::wallet::admin::{AdminWallet, WalletBalance};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// System program transfer discriminator (bincode u32)
const SYSTEM_TRANSFER: u32 = 2;

/// Parse an admin secret key
///
/// Accepts the JSON byte array written by `solana-keygen` or the base58
/// string exported by browser wallets.
pub fn parse_keypair(secret: &str) -> AppResult<Keypair> {
    let secret = secret.trim();

    if secret.starts_with('[') {
        let bytes: Vec<u8> = serde_json::from_str(secret)
            .map_err(|e| WalletError::InvalidKey(format!("Malformed key bytes: {}", e)))?;
        return Keypair::try_from(bytes.as_slice())
            .map_err(|e| WalletError::InvalidKey(e.to_string()).into());
    }

    // A keypair and a signature are both 64 bytes of base58
    let decoded = Signature::from_str(secret)
        .map_err(|e| WalletError::InvalidKey(format!("Malformed base58 secret key: {}", e)))?;
    let bytes: &[u8] = decoded.as_ref();

    Keypair::try_from(bytes).map_err(|e| WalletError::InvalidKey(e.to_string()).into())
}

/// Convert SOL to lamports, rounding to the nearest lamport
pub fn to_lamports(amount: Decimal) -> AppResult<u64> {
    (amount * Decimal::from(LAMPORTS_PER_SOL))
        .round()
        .to_u64()
        .filter(|lamports| *lamports > 0)
        .ok_or_else(|| {
            WalletError::Broadcast {
                currency: Currency::Sol,
                message: format!("Cannot send {} SOL", amount),
            }
            .into()
        })
}

fn transfer_instruction(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    Instruction {
        // System program is all zeros
        program_id: Pubkey::from([0; 32]),
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    }
}

/// Solana admin wallet - forwards SOL from the operator's hot wallet
pub struct SolanaAdminWallet {
    client: RpcClient,
    keypair: Keypair,
}

impl SolanaAdminWallet {
    pub fn new(rpc_url: impl Into<String>, keypair: Keypair) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url.into(), CommitmentConfig::confirmed()),
            keypair,
        }
    }

    /// Build from a configured key pair, checking the secret matches the public key
    pub fn from_secret(
        rpc_url: impl Into<String>,
        public_key: &str,
        secret: &str,
    ) -> AppResult<Self> {
        let keypair = parse_keypair(secret)?;
        let expected = Pubkey::from_str(public_key)
            .map_err(|e| WalletError::InvalidKey(format!("Bad admin public key: {}", e)))?;

        if keypair.pubkey() != expected {
            return Err(WalletError::InvalidKey(format!(
                "Secret key belongs to {}, not {}",
                keypair.pubkey(),
                expected
            ))
            .into());
        }

        Ok(Self::new(rpc_url, keypair))
    }

    fn broadcast_error(message: String) -> WalletError {
        WalletError::Broadcast {
            currency: Currency::Sol,
            message,
        }
    }
}

#[async_trait]
impl AdminWallet for SolanaAdminWallet {
    fn currency(&self) -> Currency {
        Currency::Sol
    }

    fn public_key(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    fn is_valid_address(&self, address: &str) -> bool {
        Pubkey::from_str(address).is_ok()
    }

    async fn get_balance(&self) -> AppResult<WalletBalance> {
        let lamports = self
            .client
            .get_balance_with_commitment(&self.keypair.pubkey(), CommitmentConfig::confirmed())
            .await
            .map_err(|e| WalletError::Balance {
                currency: Currency::Sol,
                message: e.to_string(),
            })?
            .value;

        Ok(WalletBalance {
            confirmed: Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL),
            unconfirmed: None,
        })
    }

    async fn send_transaction(&self, destination: &str, amount: Decimal) -> AppResult<String> {
        let to = Pubkey::from_str(destination)
            .map_err(|_| WalletError::InvalidDestination(destination.to_string()))?;
        let lamports = to_lamports(amount)?;
        let from = self.keypair.pubkey();

        info!("🔄 Sending {} lamports from {} to {}", lamports, from, to);

        let recent_blockhash = self
            .client
            .get_latest_blockhash()
            .await
            .map_err(|e| Self::broadcast_error(format!("Failed to get blockhash: {}", e)))?;

        let message = Message::new(&[transfer_instruction(&from, &to, lamports)], Some(&from));
        let transaction = Transaction::new(&[&self.keypair], message, recent_blockhash);

        let signature = self
            .client
            .send_and_confirm_transaction(&transaction)
            .await
            .map_err(|e| {
                error!("SOL transfer to {} failed: {}", to, e);
                Self::broadcast_error(format!("Send failed: {}", e))
            })?;

        info!("✅ SOL transfer confirmed: {}", signature);
        Ok(signature.to_string())
    }
}
