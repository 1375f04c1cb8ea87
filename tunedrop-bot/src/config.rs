//! Configuration management for tunedrop-bot
//!
//! Two-tier configuration:
//! 1. **TOML bootstrap**: transport selection, temp directory, size ceiling,
//!    logging (static, cannot change while running)
//! 2. **Environment secrets**: service credentials are read from the
//!    environment only and never from the TOML file
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--config, --transport)
//! 2. Environment variables (TUNEDROP_*)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! A missing TOML file is a warning plus defaults, never a startup failure.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tunedrop_common::{Error, Result};

const DEFAULT_TEMP_DIR: &str = "temp_downloads";
const DEFAULT_MAX_ARTIFACT_MB: u64 = 50;
const DEFAULT_WEBHOOK_BIND: &str = "0.0.0.0:8443";

/// How inbound chat events reach the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Poll the chat service for updates
    #[default]
    LongPoll,
    /// Receive updates as HTTP posts on a local listener
    Webhook,
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Update delivery mechanism
    #[serde(default)]
    pub transport: TransportMode,

    /// Directory for in-flight audio artifacts
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Delivery size ceiling in MiB; larger artifacts are discarded
    #[serde(default = "default_max_artifact_mb")]
    pub max_artifact_mb: u64,

    /// Webhook listener settings (used only when transport = "webhook")
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Local bind address for the update listener
    #[serde(default = "default_webhook_bind")]
    pub bind_addr: String,

    /// Publicly reachable URL registered with the chat service
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_webhook_bind(),
            public_url: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TEMP_DIR)
}

fn default_max_artifact_mb() -> u64 {
    DEFAULT_MAX_ARTIFACT_MB
}

fn default_webhook_bind() -> String {
    DEFAULT_WEBHOOK_BIND.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::default(),
            temp_dir: default_temp_dir(),
            max_artifact_mb: default_max_artifact_mb(),
            webhook: WebhookConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file is absent. A present-but-invalid file is an error: silently
    /// ignoring a typo'd config is worse than failing startup.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config: BotConfig = toml::from_str(&contents)
                    .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
                info!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    "Config file not found, using built-in defaults"
                );
                Ok(Self::default())
            }
            Err(err) => Err(Error::Config(format!("{}: {err}", path.display()))),
        }
    }

    pub fn max_artifact_bytes(&self) -> u64 {
        self.max_artifact_mb * 1024 * 1024
    }
}

/// Service credentials, environment-only.
#[derive(Clone)]
pub struct Secrets {
    pub telegram_token: String,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            telegram_token: require_env("TELEGRAM_TOKEN")?,
            spotify_client_id: require_env("SPOTIFY_CLIENT_ID")?,
            spotify_client_secret: require_env("SPOTIFY_CLIENT_SECRET")?,
        })
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Config(format!(
            "environment variable {name} is required"
        ))),
    }
}
