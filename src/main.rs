use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crisis_alert_engine::{app_config, db, initialize_engine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before the config is first touched
    dotenv::dotenv().ok();

    let config = match app_config::AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        },
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.rust_log.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        environment = ?config.environment,
        "Starting crisis alert engine"
    );
    if config.is_production() && !config.email.has_provider_credentials() {
        warn!("Running in production without an email provider; alerts will only be logged");
    }

    let (pool, manager) = initialize_engine(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Engine initialization failed: {}", e))?;

    match db::check_diesel_health(&pool).await {
        Ok(()) => info!("Database connection pool initialized successfully"),
        Err(e) => error!("Database health check failed: {}", e),
    }

    manager.start_all_tasks();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    manager.shutdown().await;

    Ok(())
}
