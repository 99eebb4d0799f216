use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::AppResult;
use crate::payment::models::Currency;

/// Admin wallet balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub confirmed: Decimal,
    /// `None` when the chain has no notion of pending funds for this wallet
    pub unconfirmed: Option<Decimal>,
}

/// Operator-controlled hot wallet used to forward received funds
#[async_trait]
pub trait AdminWallet: Send + Sync {
    fn currency(&self) -> Currency;

    fn ticker(&self) -> &'static str {
        self.currency().ticker()
    }

    fn public_key(&self) -> String;

    fn is_valid_address(&self, address: &str) -> bool;

    async fn get_balance(&self) -> AppResult<WalletBalance>;

    /// Send `amount` to `destination` and return the transaction id
    async fn send_transaction(&self, destination: &str, amount: Decimal) -> AppResult<String>;
}

/// Admin wallets by currency
#[derive(Default, Clone)]
pub struct AdminWallets {
    wallets: HashMap<Currency, Arc<dyn AdminWallet>>,
}

impl AdminWallets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, wallet: Arc<dyn AdminWallet>) {
        info!(
            "Registering admin wallet {} for {}",
            wallet.public_key(),
            wallet.currency()
        );
        self.wallets.insert(wallet.currency(), wallet);
    }

    pub fn get(&self, currency: Currency) -> Option<Arc<dyn AdminWallet>> {
        self.wallets.get(&currency).cloned()
    }

    pub fn currencies(&self) -> Vec<Currency> {
        let mut currencies: Vec<Currency> = self.wallets.keys().copied().collect();
        currencies.sort();
        currencies
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingWallet;

    #[test]
    fn test_wallets_by_currency() {
        let mut wallets = AdminWallets::new();
        assert!(wallets.is_empty());

        wallets.register(Arc::new(RecordingWallet::new(Currency::Sol)));

        assert_eq!(wallets.currencies(), vec![Currency::Sol]);
        assert_eq!(wallets.get(Currency::Sol).unwrap().ticker(), "SOL");
        assert!(wallets.get(Currency::Matic).is_none());
    }

    #[test]
    fn test_balance_serialization() {
        let balance = WalletBalance {
            confirmed: Decimal::new(15, 1),
            unconfirmed: None,
        };
        let json = serde_json::to_value(balance).unwrap();
        assert_eq!(json["unconfirmed"], serde_json::Value::Null);
        assert!(json.get("confirmed").is_some());
    }
}
