use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::AppResult;
use crate::lifecycle::{PayoutWorker, WebhookNotifier};
use crate::payment::models::Currency;
use crate::payment::registry::ActivePayments;
use crate::reconciler::ReconciliationScheduler;
use crate::settlement::{
    blockbook::{provider_limiter, BlockbookBackend},
    polygon::PolygonBackend,
    solana::SolanaBackend,
    BackendRouter,
};
use crate::wallet::{AdminWallets, SolanaAdminWallet};

/// Everything the server binary runs
pub struct AppComponents {
    pub registry: Arc<ActivePayments>,
    pub router: Arc<BackendRouter>,
    pub scheduler: ReconciliationScheduler,
    pub payouts: Arc<PayoutWorker>,
    pub webhooks: Arc<WebhookNotifier>,
}

pub fn initialize_components(settings: &Settings) -> AppResult<AppComponents> {
    info!("Initializing reconciler components ...");

    let router = Arc::new(initialize_router(settings)?);
    info!("🔗 Backend router ready with cohorts: {:?}", router.cohort_keys());

    let registry = Arc::new(ActivePayments::default());
    let wallets = initialize_wallets(settings)?;

    let scheduler = ReconciliationScheduler::new(registry.clone(), settings.scheduler_config());
    let payouts = Arc::new(PayoutWorker::new(registry.clone(), wallets));
    let webhooks = Arc::new(WebhookNotifier::new(registry.clone())?);

    Ok(AppComponents {
        registry,
        router,
        scheduler,
        payouts,
        webhooks,
    })
}

fn initialize_router(settings: &Settings) -> AppResult<BackendRouter> {
    let mut router = BackendRouter::new();

    info!("⚙️  Initializing settlement backends...");

    router.register_native(Currency::Sol, Arc::new(SolanaBackend::new(settings.solana_rpc_url())))?;
    router.register_native(
        Currency::Matic,
        Arc::new(PolygonBackend::new(settings.polygon_rpc_url())?),
    )?;

    let endpoints = settings.blockbook_endpoints();
    if endpoints.is_empty() {
        warn!("⚠️  No BLOCKBOOK_URL_<TICKER> set - provider invoices disabled");
    } else {
        let limiter = provider_limiter(settings.provider_requests_per_second)?;
        router.register_provider(Arc::new(BlockbookBackend::new(endpoints, limiter)?))?;
    }

    Ok(router)
}

fn initialize_wallets(settings: &Settings) -> AppResult<AdminWallets> {
    let mut wallets = AdminWallets::new();

    match settings.solana_admin_keys() {
        Some((public_key, secret)) => {
            let wallet =
                SolanaAdminWallet::from_secret(settings.solana_rpc_url(), public_key, secret)?;
            wallets.register(Arc::new(wallet));
            info!("✅ Solana admin wallet registered");
        }
        None => warn!("⚠️  SOLANA_ADMIN_PRIVATE_KEY not set - SOL payouts disabled"),
    }

    Ok(wallets)
}
