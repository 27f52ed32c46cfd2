// Library exports for the crisis alert engine
// This file exposes modules and functions for library consumers

pub mod app_config;
pub mod db;
pub mod migrations;
pub mod models;
pub mod schema;
pub mod services;
pub mod utils;

use std::sync::Arc;
use tracing::{info, warn};

// Re-export commonly used types
pub use app_config::{AppConfig, CONFIG};
pub use db::DieselPool;
pub use services::{
    AlertCleanup, AlertDeliveryWorker, AlertEngine, AlertGenerator, AlertQueueManager,
    AlertSender, BackgroundTaskManager, EmailService, Job, LogAlertSender, TaskHandle,
    TaskStatus,
};
pub use utils::ServiceError;

/// Pick the delivery backend: Resend when credentials are present, otherwise log only
pub fn build_alert_sender(
    config: &app_config::EmailConfig,
) -> Result<Arc<dyn AlertSender>, Box<dyn std::error::Error + Send + Sync>> {
    use app_config::EmailProvider;

    match config.provider {
        EmailProvider::Resend if config.has_provider_credentials() => {
            info!("Alert emails will be delivered through Resend");
            let service = EmailService::new(config.clone()).map_err(|e| e.to_string())?;
            Ok(Arc::new(service))
        },
        EmailProvider::Resend => {
            warn!("RESEND_API_KEY not set, alert emails will only be logged");
            Ok(Arc::new(LogAlertSender))
        },
        EmailProvider::Log => {
            info!("Alert emails will only be logged");
            Ok(Arc::new(LogAlertSender))
        },
    }
}

// Library initialization function for external consumers
// Builds the pool, applies migrations and wires the scheduler
pub async fn initialize_engine(
    config: &AppConfig,
) -> Result<(DieselPool, BackgroundTaskManager), Box<dyn std::error::Error + Send + Sync>> {
    info!(
        "Database URL: {}",
        db::mask_connection_string(&config.database.url)
    );
    let diesel_pool = db::create_diesel_pool(db::DieselDatabaseConfig::from(&config.database)).await?;

    if migrations::should_run_migrations(config) {
        info!("Running embedded migrations...");
        migrations::run_all_migrations(&config.database.url).await?;
    }

    let sender = build_alert_sender(&config.email)?;
    let engine = AlertEngine::new(diesel_pool.clone(), sender, &config.alerts);
    let manager = BackgroundTaskManager::new(Arc::new(engine), config.scheduler.clone());

    Ok((diesel_pool, manager))
}
