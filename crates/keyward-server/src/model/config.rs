//! Configuration management for Keyward server
//!
//! Sources, highest precedence first: command line flags (and the plain
//! `HOST`/`PORT`/`DEFAULT_EXPIRY`/`REDIS_URL` environment variables they fall
//! back to), `KEYWARD_*` environment variables, the YAML config file, and
//! the built-in defaults applied by the getters.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use keyward_common::{
    DEFAULT_EXPIRY_MS, DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT, DEFAULT_SERVER_ADDRESS,
    DEFAULT_SERVER_PORT, StorageMode, parse_positive,
};
use keyward_core::RedisStoreConfig;

use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

pub const SERVER_ADDRESS: &str = "server.address";
pub const SERVER_PORT: &str = "server.port";
pub const LOCK_DEFAULT_EXPIRY: &str = "lock.default_expiry";
pub const STORAGE_MODE: &str = "storage.mode";
pub const REDIS_URL: &str = "redis.url";
pub const REDIS_HOST: &str = "redis.host";
pub const REDIS_PORT: &str = "redis.port";
pub const REDIS_KEY_PREFIX: &str = "redis.key_prefix";

/// Command line arguments for the server
///
/// Numeric values are kept as strings so that an unparsable value falls
/// through to the next configuration source instead of aborting startup.
#[derive(Debug, Default, Parser)]
#[command(name = "keyward-server", version, about = "Distributed lock coordinator")]
pub struct Cli {
    /// HTTP listen port
    #[arg(short = 'p', long = "port", env = "PORT")]
    pub port: Option<String>,
    /// HTTP listen address
    #[arg(short = 'H', long = "host", env = "HOST")]
    pub host: Option<String>,
    /// Redis port
    #[arg(short = 'P', long = "redis-port")]
    pub redis_port: Option<String>,
    /// Redis host
    #[arg(short = 'R', long = "redis-host")]
    pub redis_host: Option<String>,
    /// Full Redis connection URL
    #[arg(long = "redis-url", env = "REDIS_URL")]
    pub redis_url: Option<String>,
    /// Use the in-memory store instead of Redis
    #[arg(short = 'N', long = "no-redis")]
    pub no_redis: bool,
    /// Lease applied when a lock request has no `exp` (milliseconds)
    #[arg(short = 'E', long = "default-expiry", env = "DEFAULT_EXPIRY")]
    pub default_expiry: Option<String>,
    /// Config file path (default `conf/application.yml`, optional)
    #[arg(short = 'c', long = "config")]
    pub config_file: Option<String>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration from the process arguments and environment
    pub fn new() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> anyhow::Result<Self> {
        let mut config_builder = Config::builder();

        config_builder = match &args.config_file {
            Some(path) => config_builder.add_source(File::with_name(path)),
            None => config_builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        config_builder = config_builder.add_source(
            Environment::with_prefix("KEYWARD")
                .prefix_separator("_")
                .separator(".")
                .try_parsing(true),
        );

        let config_builder = apply_cli_overrides(config_builder, &args)
            .context("Failed to apply command line overrides")?;

        let app_config = config_builder
            .build()
            .with_context(|| match &args.config_file {
                Some(path) => format!("Failed to build configuration from {}", path),
                None => format!("Failed to build configuration - check {}", DEFAULT_CONFIG_FILE),
            })?;

        Ok(Configuration { config: app_config })
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string(SERVER_ADDRESS)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_SERVER_ADDRESS.to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int(SERVER_PORT)
            .ok()
            .and_then(|v| u16::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    /// Lease applied when a lock request carries no expiry
    pub fn default_expiry(&self) -> Duration {
        let millis = self
            .config
            .get_int(LOCK_DEFAULT_EXPIRY)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_EXPIRY_MS);
        Duration::from_millis(millis)
    }

    // ========================================================================
    // Storage Configuration
    // ========================================================================

    pub fn storage_mode(&self) -> StorageMode {
        self.config
            .get_string(STORAGE_MODE)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn redis_url(&self) -> String {
        if let Some(url) = self.config.get_string(REDIS_URL).ok().filter(|v| !v.is_empty()) {
            return url;
        }

        let host = self
            .config
            .get_string(REDIS_HOST)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_REDIS_HOST.to_string());
        let port = self
            .config
            .get_int(REDIS_PORT)
            .ok()
            .and_then(|v| u16::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_REDIS_PORT);
        format!("redis://{}:{}", host, port)
    }

    pub fn redis_key_prefix(&self) -> String {
        self.config
            .get_string(REDIS_KEY_PREFIX)
            .unwrap_or_default()
    }

    pub fn redis_store_config(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            url: self.redis_url(),
            key_prefix: self.redis_key_prefix(),
            default_lease: self.default_expiry(),
        }
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    /// `KEYWARD_LOG_*` variables win over the `logging.*` keys
    pub fn logging_config(&self) -> LoggingConfig {
        let log_dir = std::env::var("KEYWARD_LOG_DIR")
            .ok()
            .or_else(|| self.config.get_string("logging.dir").ok());
        let console_output = env_flag("KEYWARD_LOG_CONSOLE")
            .or_else(|| self.config.get_bool("logging.console").ok())
            .unwrap_or(true);
        let file_logging = env_flag("KEYWARD_LOG_FILE")
            .or_else(|| self.config.get_bool("logging.file").ok())
            .unwrap_or(false);
        let level = std::env::var("KEYWARD_LOG_LEVEL")
            .ok()
            .or_else(|| self.config.get_string("logging.level").ok())
            .unwrap_or("info".to_string());

        LoggingConfig::from_config(log_dir, console_output, file_logging, level)
    }
}

fn apply_cli_overrides(
    mut builder: ConfigBuilder<DefaultState>,
    args: &Cli,
) -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    if let Some(v) = args.host.as_deref().filter(|v| !v.is_empty()) {
        builder = builder.set_override(SERVER_ADDRESS, v)?;
    }
    if let Some(v) = args
        .port
        .as_deref()
        .and_then(parse_positive)
        .filter(|v| *v <= u16::MAX as u64)
    {
        builder = builder.set_override(SERVER_PORT, v as i64)?;
    }
    if let Some(v) = args.default_expiry.as_deref().and_then(parse_positive) {
        builder = builder.set_override(LOCK_DEFAULT_EXPIRY, v as i64)?;
    }
    if let Some(v) = args.redis_url.as_deref().filter(|v| !v.is_empty()) {
        builder = builder.set_override(REDIS_URL, v)?;
    }

    // Explicit host/port flags replace any configured URL
    let redis_host = args.redis_host.as_deref().filter(|v| !v.is_empty());
    let redis_port = args
        .redis_port
        .as_deref()
        .and_then(parse_positive)
        .filter(|v| *v <= u16::MAX as u64);
    if redis_host.is_some() || redis_port.is_some() {
        builder = builder.set_override(REDIS_URL, "")?;
    }
    if let Some(v) = redis_host {
        builder = builder.set_override(REDIS_HOST, v)?;
    }
    if let Some(v) = redis_port {
        builder = builder.set_override(REDIS_PORT, v as i64)?;
    }

    if args.no_redis {
        builder = builder.set_override(STORAGE_MODE, StorageMode::Memory.as_str())?;
    }

    Ok(builder)
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}
