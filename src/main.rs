use anyhow::{Context, Result};
use chrono::Utc;
use garbage_courier::config::AppConfig;
use garbage_courier::context::AppContext;
use garbage_courier::gateway::TelegramGateway;
use garbage_courier::payments::{PaymentProvider, YooKassaClient};
use garbage_courier::server::{self, ServerState};
use garbage_courier::settings::DbSettings;
use garbage_courier::{db, errors, lifecycle, localization, observability, roles};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    config.validate()?;

    let metrics_handle = observability::init_observability(&config.observability)?;
    info!("{}", config.summary());

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to the database")?;

    db::init_database_schema(&pool).await?;
    roles::seed_configured_roles(&pool, &config.orders).await?;

    let gateway = TelegramGateway::new(
        &config.bot.token,
        Duration::from_secs(config.bot.http_timeout_secs),
    )?;

    let payments: Option<Arc<dyn PaymentProvider>> = match YooKassaClient::from_config(&config.payment)? {
        Some(client) => Some(Arc::new(client)),
        None => {
            warn!("Payment credentials not configured, payment creation disabled");
            None
        }
    };
    if config.orders.require_payment && payments.is_none() {
        warn!("ORDER_REQUIRE_PAYMENT is set but payments are disabled; new orders will wait for payment indefinitely");
    }

    let app = AppContext {
        pool: pool.clone(),
        gateway: Arc::new(gateway),
        payments,
        settings: Arc::new(DbSettings::new(pool.clone())),
        localization: localization::create_localization_manager(&config.bot.default_language)?,
        orders: config.orders.clone(),
        support_url: config.bot.support_url.clone(),
    };

    let shutdown = CancellationToken::new();
    let sweeper = spawn_unpaid_sweeper(app.clone(), config.orders.unpaid_sweep_interval_secs, shutdown.clone());

    let state = Arc::new(ServerState {
        app,
        metrics: Some(metrics_handle),
        bot_token: config.bot.token.clone(),
        jobs_auth_token: config.server.jobs_auth_token.clone(),
        bot_error_policy: config.server.bot_error_policy,
        payment_error_policy: config.server.payment_error_policy,
    });

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            errors::error_logging::log_internal_error(&e, "main", "ctrl_c", None);
        }
        info!("Shutdown signal received");
        server_shutdown.cancel();
    });

    server::serve(state, config.server.port, shutdown.clone()).await?;

    shutdown.cancel();
    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.await {
            errors::error_logging::log_internal_error(&e, "main", "unpaid_sweeper", None);
        }
    }
    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Periodically cancel unpaid orders; an interval of 0 leaves it to `/jobs/cancel-unpaid`
fn spawn_unpaid_sweeper(
    app: AppContext,
    interval_secs: u64,
    shutdown: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval_secs == 0 {
        info!("In-process unpaid order sweep disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = lifecycle::cancel_unpaid_orders(&app, Utc::now()).await {
                        errors::error_logging::log_internal_error(&e, "unpaid_sweeper", "cancel_unpaid_orders", None);
                    }
                }
            }
        }
    }))
}
