// Centralized configuration management for the alert engine
// Load ALL env vars ONCE at startup

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Global application configuration loaded once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    // For tests, load .env file first
    #[cfg(test)]
    dotenv::dotenv().ok();

    AppConfig::from_env().expect("Failed to load configuration")
});

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub rust_log: String,
    pub disable_embedded_migrations: bool,

    pub database: DatabaseConfig,
    pub email: EmailConfig,
    pub alerts: AlertConfig,
    pub scheduler: SchedulerConfig,
}

/// Environment type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl From<String> for Environment {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "test" => Environment::Test,
            "staging" | "stage" => Environment::Staging,
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
    pub idle_timeout: u64,
    pub max_lifetime: u64,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub provider: EmailProvider,
    /// Empty means no provider is configured; alerts are logged instead of sent
    pub resend_api_key: String,
    pub resend_api_url: String,
    pub from_email: String,
    pub from_name: String,
    pub support_email: String,
    pub dashboard_url: String, // Linked from alert emails
}

impl EmailConfig {
    pub fn has_provider_credentials(&self) -> bool {
        !self.resend_api_key.trim().is_empty()
    }
}

/// Email provider type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EmailProvider {
    Resend,
    Log,
}

impl From<String> for EmailProvider {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "resend" => EmailProvider::Resend,
            "log" | "none" => EmailProvider::Log,
            _ => EmailProvider::Resend,
        }
    }
}

/// Alert targeting, queueing and retention settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertConfig {
    /// Users within this distance of a disaster are matched (inclusive)
    pub radius_km: f64,
    /// Severity at or above which an alert is `high_severity`
    pub high_severity_threshold: i32,
    /// Severity at or above which an alert is `new_crisis`
    pub new_crisis_threshold: i32,
    /// How far back the generator looks for unalerted disasters
    pub detection_window_minutes: i64,
    pub delivery_batch_size: i64,
    pub max_retries: i32,
    pub retry_backoff_base_secs: u64,
    pub retry_backoff_max_secs: u64,
    pub send_timeout_secs: u64,
    /// `processing` rows untouched for this long are treated as a lost delivery
    pub processing_timeout_secs: u64,
    pub read_alert_retention_days: i64,
    pub queue_retention_days: i64,
    /// Also delete `dead` and `skipped` rows during cleanup
    pub cleanup_delete_dead: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            radius_km: 100.0,
            high_severity_threshold: 4,
            new_crisis_threshold: 3,
            detection_window_minutes: 5,
            delivery_batch_size: 50,
            max_retries: 3,
            retry_backoff_base_secs: 60,
            retry_backoff_max_secs: 3600,
            send_timeout_secs: 30,
            processing_timeout_secs: 900,
            read_alert_retention_days: 30,
            queue_retention_days: 7,
            cleanup_delete_dead: false,
        }
    }
}

impl AlertConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_base_secs)
    }

    pub fn retry_backoff_max(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_max_secs)
    }

    pub fn processing_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.processing_timeout_secs as i64)
    }
}

/// Periods of the background jobs, in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    pub generate_interval_secs: u64,
    pub queue_interval_secs: u64,
    pub delivery_interval_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            generate_interval_secs: 300,
            queue_interval_secs: 120,
            delivery_interval_secs: 120,
            cleanup_interval_secs: 86_400,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Helper function to get required env var
        let get_required = |key: &str| -> Result<String, ConfigError> {
            env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
        };

        // Helper function to get optional env var with default
        let get_or_default = |key: &str, default: &str| -> String {
            env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let parse_or_default = |key: &str, default: &str| -> Result<u32, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u32".to_string())
            })
        };

        let parse_u64_or_default = |key: &str, default: &str| -> Result<u64, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u64".to_string())
            })
        };

        let parse_i64_or_default = |key: &str, default: &str| -> Result<i64, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid integer".to_string())
            })
        };

        let parse_severity = |key: &str, default: &str| -> Result<i32, ConfigError> {
            let value: i32 = get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid integer".to_string())
            })?;
            if !(1..=5).contains(&value) {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    "severity must be between 1 and 5".to_string(),
                ));
            }
            Ok(value)
        };

        let parse_bool_or_default = |key: &str, default: &str| -> bool {
            get_or_default(key, default).to_lowercase() == "true"
        };

        let environment = Environment::from(get_or_default("ENVIRONMENT", "development"));
        let rust_log = get_or_default("RUST_LOG", "crisis_alert_engine=info");
        let disable_embedded_migrations =
            parse_bool_or_default("DISABLE_EMBEDDED_MIGRATIONS", "false");

        let database = DatabaseConfig {
            url: get_required("DATABASE_URL")?,
            max_connections: parse_or_default("DATABASE_MAX_CONNECTIONS", "20")?,
            min_connections: parse_or_default("DATABASE_MIN_CONNECTIONS", "2")?,
            connect_timeout: parse_u64_or_default("DATABASE_CONNECT_TIMEOUT", "30")?,
            idle_timeout: parse_u64_or_default("DATABASE_IDLE_TIMEOUT", "600")?,
            max_lifetime: parse_u64_or_default("DATABASE_MAX_LIFETIME", "1800")?,
        };

        let resend_api_key = get_or_default("RESEND_API_KEY", "");
        let default_provider = if resend_api_key.is_empty() { "log" } else { "resend" };
        let email = EmailConfig {
            provider: get_or_default("EMAIL_PROVIDER", default_provider).into(),
            resend_api_key,
            resend_api_url: get_or_default("RESEND_API_URL", "https://api.resend.com/emails"),
            from_email: get_or_default("EMAIL_FROM_ADDRESS", "alerts@crisis-monitor.local"),
            from_name: get_or_default("EMAIL_FROM_NAME", "Crisis Monitor"),
            support_email: get_or_default("SUPPORT_EMAIL", "support@crisis-monitor.local"),
            dashboard_url: get_or_default("DASHBOARD_URL", "http://localhost:3000"),
        };

        let high_severity_threshold = parse_severity("ALERT_HIGH_SEVERITY_THRESHOLD", "4")?;
        let new_crisis_threshold = parse_severity("ALERT_NEW_CRISIS_THRESHOLD", "3")?;
        if new_crisis_threshold > high_severity_threshold {
            return Err(ConfigError::InvalidValue(
                "ALERT_NEW_CRISIS_THRESHOLD".to_string(),
                "must not exceed ALERT_HIGH_SEVERITY_THRESHOLD".to_string(),
            ));
        }

        let radius_km: f64 = get_or_default("ALERT_RADIUS_KM", "100")
            .parse()
            .map_err(|_| {
                ConfigError::InvalidValue("ALERT_RADIUS_KM".to_string(), "not a number".to_string())
            })?;
        if !(radius_km.is_finite() && radius_km >= 0.0) {
            return Err(ConfigError::InvalidValue(
                "ALERT_RADIUS_KM".to_string(),
                "must be a non-negative distance".to_string(),
            ));
        }

        let max_retries = parse_or_default("ALERT_MAX_RETRIES", "3")?;
        if max_retries == 0 {
            return Err(ConfigError::InvalidValue(
                "ALERT_MAX_RETRIES".to_string(),
                "at least one attempt is required".to_string(),
            ));
        }

        let alerts = AlertConfig {
            radius_km,
            high_severity_threshold,
            new_crisis_threshold,
            detection_window_minutes: parse_i64_or_default("ALERT_DETECTION_WINDOW_MINUTES", "5")?,
            delivery_batch_size: parse_i64_or_default("ALERT_DELIVERY_BATCH_SIZE", "50")?.max(1),
            max_retries: max_retries as i32,
            retry_backoff_base_secs: parse_u64_or_default("ALERT_RETRY_BACKOFF_BASE_SECS", "60")?,
            retry_backoff_max_secs: parse_u64_or_default("ALERT_RETRY_BACKOFF_MAX_SECS", "3600")?,
            send_timeout_secs: parse_u64_or_default("ALERT_SEND_TIMEOUT_SECS", "30")?,
            processing_timeout_secs: parse_u64_or_default("ALERT_PROCESSING_TIMEOUT_SECS", "900")?,
            read_alert_retention_days: parse_i64_or_default("ALERT_READ_RETENTION_DAYS", "30")?,
            queue_retention_days: parse_i64_or_default("ALERT_QUEUE_RETENTION_DAYS", "7")?,
            cleanup_delete_dead: parse_bool_or_default("CLEANUP_DELETE_DEAD", "false"),
        };

        let scheduler = SchedulerConfig {
            generate_interval_secs: parse_u64_or_default("GENERATE_ALERTS_INTERVAL_SECS", "300")?,
            queue_interval_secs: parse_u64_or_default("PROCESS_QUEUE_INTERVAL_SECS", "120")?,
            delivery_interval_secs: parse_u64_or_default("DELIVER_ALERTS_INTERVAL_SECS", "120")?,
            cleanup_interval_secs: parse_u64_or_default("CLEANUP_INTERVAL_SECS", "86400")?,
        };

        Ok(Self {
            environment,
            rust_log,
            disable_embedded_migrations,
            database,
            email,
            alerts,
            scheduler,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

/// Get the global configuration instance
/// This is the primary way to access configuration throughout the app
pub fn config() -> &'static AppConfig {
    &CONFIG
}
