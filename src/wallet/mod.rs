// Admin wallets used to forward confirmed funds to merchants
pub mod admin;
pub mod solana;

pub use admin::{AdminWallet, AdminWallets, WalletBalance};
pub use solana::SolanaAdminWallet;
