use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Application configuration loaded from config files and `NYX_*` environment
/// variables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Public base URL of this API (used to build callback and payment links)
    pub host: String,

    /// Public base URL of the landing site (redirect target after checkout)
    pub landing_host: String,

    /// Admin notification recipient
    pub admin_email: String,

    /// Bind address for the HTTP server
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Whether to seed the catalog reference data on startup
    #[serde(default)]
    pub auto_seed: bool,

    /// Active payment provider: "paypal", "stripe" or "testing"
    #[serde(default = "default_payment_provider")]
    #[validate(custom = "validate_payment_provider")]
    pub payment_provider: String,

    /// Treat `use_testing` confirmation callbacks as paid (test environments only)
    #[serde(default)]
    pub is_testing: bool,

    /// PayPal Orders v2 API base, e.g. https://api-m.sandbox.paypal.com
    #[serde(default = "default_paypal_api_base")]
    pub paypal_api_base: String,

    #[serde(default)]
    pub paypal_client_id: String,

    #[serde(default)]
    pub paypal_client_secret: String,

    /// Stripe API base (overridable for tests)
    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    #[serde(default)]
    pub stripe_secret_key: String,

    /// Hard timeout for payment provider HTTP calls, in seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Percentage discount granted by affiliate promo codes
    #[serde(default = "default_affiliates_discount")]
    pub affiliates_discount: Decimal,

    /// Commission rate credited to affiliates per paid order (fraction, e.g. 0.10)
    #[serde(default = "default_affiliates_commission")]
    #[validate(custom = "validate_rate_fraction")]
    pub affiliates_commission: Decimal,

    /// IGI tax rate applied on invoices, percent
    #[serde(default = "default_igi_rate")]
    pub igi_rate: Decimal,

    /// PayPal fee rate applied on invoices, percent
    #[serde(default = "default_paypal_fee_rate")]
    pub paypal_fee_rate: Decimal,

    /// Stripe fee rate applied on invoices, percent
    #[serde(default = "default_stripe_fee_rate")]
    pub stripe_fee_rate: Decimal,

    /// Root directory for stored objects (logos, invoices)
    #[serde(default = "default_media_root")]
    pub media_root: String,

    /// Public base URL under which stored objects are served
    #[serde(default = "default_media_url")]
    pub media_url: String,

    /// Endpoint of the external email renderer; empty disables outbound email
    #[serde(default)]
    pub email_renderer_url: String,

    /// Endpoint of the external invoice PDF generator; empty uses a local no-op
    #[serde(default)]
    pub invoice_generator_url: String,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Minimal constructor used by tests and tools.
    pub fn new(database_url: String, host: String, landing_host: String) -> Self {
        Self {
            database_url,
            host,
            landing_host,
            admin_email: "admin@nyxtrackers.com".to_string(),
            bind_address: default_bind_address(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            auto_migrate: false,
            auto_seed: false,
            payment_provider: default_payment_provider(),
            is_testing: false,
            paypal_api_base: default_paypal_api_base(),
            paypal_client_id: String::new(),
            paypal_client_secret: String::new(),
            stripe_api_base: default_stripe_api_base(),
            stripe_secret_key: String::new(),
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            affiliates_discount: default_affiliates_discount(),
            affiliates_commission: default_affiliates_commission(),
            igi_rate: default_igi_rate(),
            paypal_fee_rate: default_paypal_fee_rate(),
            stripe_fee_rate: default_stripe_fee_rate(),
            media_root: default_media_root(),
            media_url: default_media_url(),
            email_renderer_url: String::new(),
            invoice_generator_url: String::new(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            db_min_connections: DEFAULT_DB_MIN_CONNECTIONS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    /// Landing URL the browser is sent to after a confirmation attempt.
    pub fn landing_redirect(&self, sale_id: &str, status: &str) -> String {
        format!(
            "{}/?sale-id={}&sale-status={}",
            self.landing_host, sale_id, status
        )
    }

    /// Re-mint endpoint embedded in reminder emails.
    pub fn payment_link_url(&self, order_id: &str) -> String {
        format!("{}/api/store/payment-link/{}/", self.host, order_id)
    }

    /// Invoice fee rate for the given provider, percent.
    pub fn provider_fee_rate(&self, provider: &str) -> Decimal {
        match provider {
            "stripe" => self.stripe_fee_rate,
            _ => self.paypal_fee_rate,
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_payment_provider() -> String {
    "paypal".to_string()
}
fn default_paypal_api_base() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}
fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}
fn default_provider_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}
fn default_affiliates_discount() -> Decimal {
    dec!(10)
}
fn default_affiliates_commission() -> Decimal {
    dec!(0.10)
}
fn default_igi_rate() -> Decimal {
    dec!(4.5)
}
fn default_paypal_fee_rate() -> Decimal {
    dec!(4.8)
}
fn default_stripe_fee_rate() -> Decimal {
    dec!(4.2)
}
fn default_media_root() -> String {
    "media".to_string()
}
fn default_media_url() -> String {
    "/media".to_string()
}
fn default_db_max_connections() -> u32 {
    DEFAULT_DB_MAX_CONNECTIONS
}
fn default_db_min_connections() -> u32 {
    DEFAULT_DB_MIN_CONNECTIONS
}
fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn validate_payment_provider(provider: &str) -> Result<(), ValidationError> {
    match provider {
        "paypal" | "stripe" | "testing" => Ok(()),
        _ => {
            let mut err = ValidationError::new("payment_provider");
            err.message = Some("payment_provider must be one of: paypal, stripe, testing".into());
            Err(err)
        }
    }
}

fn validate_rate_fraction(rate: &Decimal) -> Result<(), ValidationError> {
    if *rate >= Decimal::ZERO && *rate <= Decimal::ONE {
        Ok(())
    } else {
        let mut err = ValidationError::new("rate");
        err.message = Some("rate must be a fraction between 0 and 1".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("nyx_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (NYX_*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("NYX_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://nyx.db?mode=rwc")?
        .set_default("host", "http://localhost:8080")?
        .set_default("landing_host", "http://localhost:3000")?
        .set_default("admin_email", "admin@nyxtrackers.com")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("NYX").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
