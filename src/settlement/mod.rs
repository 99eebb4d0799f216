// Settlement backends - one status-check attempt against a chain or provider
pub mod blockbook;
pub mod polygon;
pub mod router;
pub mod solana;
pub mod traits;

pub use router::BackendRouter;
pub use traits::{derive_status, ChainBalance, Observation, SettlementBackend, StatusCheck};
