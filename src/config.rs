use std::env;
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn, Level};
use validator::{Validate, ValidationError, ValidationErrors};

const CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "APP";

mod defaults {
    pub const ENVIRONMENT: &str = "development";
    pub const DATABASE_URL: &str = "sqlite://bakery.db?mode=rwc";
    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 8080;
    pub const LOG_LEVEL: &str = "info";
    pub const CURRENCY: &str = "COP";

    pub fn port() -> u16 {
        PORT
    }
    pub fn log_level() -> String {
        LOG_LEVEL.to_string()
    }
    pub fn currency() -> String {
        CURRENCY.to_string()
    }
    pub fn pool_max() -> u32 {
        10
    }
    pub fn pool_min() -> u32 {
        1
    }
    pub fn pool_connect_secs() -> u64 {
        8
    }
    pub fn pool_idle_secs() -> u64 {
        300
    }
    pub fn pool_acquire_secs() -> u64 {
        8
    }
    pub fn event_capacity() -> usize {
        1024
    }
    pub fn request_timeout_secs() -> u64 {
        30
    }
    pub fn page_size() -> u64 {
        20
    }
    pub fn max_page_size() -> u64 {
        100
    }
    pub fn session_cart_ttl_secs() -> u64 {
        30 * 24 * 60 * 60
    }
    pub fn cart_sweep_interval_secs() -> u64 {
        15 * 60
    }
}

/// Runtime settings for the storefront API and the CLI.
///
/// Field names double as keys in `config/*.toml` and as `APP__<FIELD>`
/// environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
    /// `development`, `test` or `production`
    pub environment: String,

    #[serde(default = "defaults::log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub auto_migrate: bool,

    /// Comma separated origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    #[serde(default = "defaults::pool_max")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,
    #[serde(default = "defaults::pool_min")]
    pub db_min_connections: u32,
    #[serde(default = "defaults::pool_connect_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "defaults::pool_idle_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "defaults::pool_acquire_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default = "defaults::event_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// ISO code appended to receipt totals
    #[serde(default = "defaults::currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    #[serde(default = "defaults::request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    #[serde(default = "defaults::page_size")]
    pub api_default_page_size: u64,
    #[serde(default = "defaults::max_page_size")]
    #[validate(range(min = 1))]
    pub api_max_page_size: u64,

    /// Anonymous carts idle for longer than this are dropped
    #[serde(default = "defaults::session_cart_ttl_secs")]
    #[validate(range(min = 1))]
    pub session_cart_ttl_secs: u64,
    #[serde(default = "defaults::cart_sweep_interval_secs")]
    #[validate(range(min = 1))]
    pub cart_sweep_interval_secs: u64,
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("could not read configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationErrors),
}

impl AppConfig {
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: defaults::log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: defaults::pool_max(),
            db_min_connections: defaults::pool_min(),
            db_connect_timeout_secs: defaults::pool_connect_secs(),
            db_idle_timeout_secs: defaults::pool_idle_secs(),
            db_acquire_timeout_secs: defaults::pool_acquire_secs(),
            event_channel_capacity: defaults::event_capacity(),
            currency: defaults::currency(),
            request_timeout_secs: defaults::request_timeout_secs(),
            api_default_page_size: defaults::page_size(),
            api_max_page_size: defaults::max_page_size(),
            session_cart_ttl_secs: defaults::session_cart_ttl_secs(),
            cart_sweep_interval_secs: defaults::cart_sweep_interval_secs(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Explicit CORS origins, trimmed and without blanks
    pub fn cors_origins(&self) -> Vec<&str> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Page size for list endpoints, bounded by `api_max_page_size`
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.api_default_page_size)
            .clamp(1, self.api_max_page_size)
    }

    /// Field validation plus the rules that span several fields
    pub fn check(&self) -> Result<(), ValidationErrors> {
        self.validate()?;

        let mut errors = ValidationErrors::new();
        if self.cors_origins().is_empty() && !self.should_allow_permissive_cors() {
            errors.add(
                "cors_allowed_origins",
                invalid(
                    "cors_allowed_origins_required",
                    "outside development set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true",
                ),
            );
        }
        if self.db_min_connections > self.db_max_connections {
            errors.add(
                "db_min_connections",
                invalid("pool_bounds", "db_min_connections is above db_max_connections"),
            );
        }
        if self.api_default_page_size > self.api_max_page_size {
            errors.add(
                "api_default_page_size",
                invalid("page_bounds", "api_default_page_size is above api_max_page_size"),
            );
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    level
        .parse::<Level>()
        .map(|_| ())
        .map_err(|_| invalid("log_level", "expected trace, debug, info, warn or error"))
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|directive| !directive.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(format!("bakery_api={level},tower_http=debug")));

    let installed = if json {
        fmt().with_env_filter(filter).json().try_init()
    } else {
        fmt().with_env_filter(filter).try_init()
    };
    if installed.is_err() {
        warn!("tracing subscriber was already installed");
    }
}

/// Reads `config/default.toml`, then `config/{RUN_ENV}.toml`, then `APP__*`
/// variables, each layer overriding the previous one.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| defaults::ENVIRONMENT.to_string());

    if !Path::new(CONFIG_DIR).is_dir() {
        info!(dir = CONFIG_DIR, "no config directory; using defaults and environment");
    }

    let settings = Config::builder()
        .set_default("database_url", defaults::DATABASE_URL)?
        .set_default("host", defaults::HOST)?
        .set_default("port", i64::from(defaults::PORT))?
        .set_default("environment", run_env.as_str())?
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let cfg: AppConfig = settings.try_deserialize()?;
    cfg.check()?;

    info!(environment = %cfg.environment, port = cfg.port, "configuration loaded");
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn production_needs_explicit_origins() {
        let cfg = production();
        assert!(cfg.check().is_err());
    }

    #[test]
    fn production_with_origins_passes() {
        let mut cfg = production();
        cfg.cors_allowed_origins = Some(" https://panaderia.example , ,".into());
        assert!(cfg.check().is_ok());
        assert_eq!(cfg.cors_origins(), vec!["https://panaderia.example"]);
    }

    #[test]
    fn development_falls_back_to_permissive_cors() {
        let mut cfg = production();
        cfg.environment = "development".into();
        assert!(cfg.check().is_ok());
        assert!(cfg.should_allow_permissive_cors());
    }

    #[test]
    fn pool_bounds_are_checked() {
        let mut cfg = production();
        cfg.cors_allow_any_origin = true;
        cfg.db_min_connections = 20;
        assert!(cfg.check().is_err());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut cfg = production();
        cfg.cors_allow_any_origin = true;
        cfg.log_level = "loud".into();
        assert!(cfg.check().is_err());

        cfg.log_level = "DEBUG".into();
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn page_size_is_clamped() {
        let cfg = production();
        assert_eq!(cfg.page_size(None), 20);
        assert_eq!(cfg.page_size(Some(0)), 1);
        assert_eq!(cfg.page_size(Some(5_000)), 100);
    }

    #[test]
    fn defaults_to_colombian_pesos() {
        assert_eq!(production().currency, "COP");
    }
}
