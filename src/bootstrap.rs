use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    api::handler::AppState,
    config::{Config, SettlementConfig},
    error::AppResult,
    ledger::{postgres::PgPledgeLedger, PledgeLedger},
    notify::PledgeNotifier,
    payments::{stripe::StripeProcessor, PaymentProcessor},
    pledges::service::PledgeService,
    settlement::{executor::ChargeExecutor, scheduler::SettlementScheduler},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    // Database pool
    let pool = initialize_database(&config.database_url).await?;

    let settlement_config = SettlementConfig::default();

    // Core components
    let ledger: Arc<dyn PledgeLedger> = Arc::new(PgPledgeLedger::new(pool.clone()));

    let processor: Arc<dyn PaymentProcessor> =
        Arc::new(StripeProcessor::new(config.stripe_secret_key.clone()));
    info!("✅ Stripe payment processor initialized");

    let notifier = Arc::new(PledgeNotifier::new(config.notify_webhook_url.clone()));
    match &config.notify_webhook_url {
        Some(url) => info!("✅ Pledge notifier initialized: {}", url),
        None => info!("⚠️  NOTIFY_WEBHOOK_URL not set - notifications disabled"),
    }

    let executor = Arc::new(ChargeExecutor::new(
        settlement_config.clone(),
        ledger.clone(),
        processor.clone(),
        notifier.clone(),
    ));
    info!("✅ Charge executor initialized");

    let scheduler = Arc::new(SettlementScheduler::new(
        settlement_config.clone(),
        ledger.clone(),
        executor.clone(),
    ));

    if config.scheduler_enabled {
        scheduler.start();
        info!(
            "✅ Settlement scheduler started (daily at {:02}:00 UTC)",
            settlement_config.execution_hour
        );
    } else {
        info!("⚠️  Settlement scheduler disabled - settle via POST /api/v1/settlement/run");
    }

    let pledge_service = Arc::new(PledgeService::new(
        settlement_config,
        ledger.clone(),
        notifier.clone(),
    ));
    info!("✅ Pledge service initialized");

    Ok(AppState {
        pledge_service,
        scheduler,
        ledger,
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(50)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 50 max connections");

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
