use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invoice_reconciler::{bootstrap, config::Settings};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,invoice_reconciler=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting invoice reconciler");

    let settings = Settings::from_env().context("Invalid configuration")?;
    let components =
        bootstrap::initialize_components(&settings).context("Failed to initialize components")?;

    let _webhooks = components.webhooks.clone().start();
    let _payouts = components.payouts.clone().start();
    let batches = components
        .scheduler
        .start()
        .context("Reconciliation scheduler already running")?;

    info!("🌐 Reconciler running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down, letting the current batch finish...");
    components.scheduler.stop();
    batches.await.context("Scheduler task failed")?;

    info!("👋 Reconciler stopped");
    Ok(())
}
