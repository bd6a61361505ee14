//! Configuration loading.
//!
//! Loads `genpipe.toml` (or `$GENPIPE_CONFIG_PATH`). Environment variables
//! override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::entities::AppConfig;
use crate::moderation::{ModerationSettings, DEFAULT_BUFFER_SIZE};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "GENPIPE_CONFIG_PATH";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "genpipe.toml";

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenpipeConfig {
    /// App the pipeline generates for, including its moderation rule.
    pub app: AppConfig,
    /// Message database.
    pub database: DatabaseConfig,
    /// Output moderation worker tuning.
    pub moderation: ModerationConfig,
    /// Queue listener timing.
    pub queue: QueueConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

impl GenpipeConfig {
    /// Load with precedence: env vars > TOML file > defaults.
    ///
    /// If the file does not exist, defaults are used.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a TOML file only, without env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                toml::from_str(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Parse a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Resolve the config file path using a custom env resolver.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests never touch the process environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("GENPIPE_DATABASE_PATH") {
            self.database.path = v;
        }
        if let Some(v) = env("GENPIPE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env("GENPIPE_TENANT_ID") {
            self.app.tenant_id = v;
        }
        if let Some(v) = env("GENPIPE_APP_ID") {
            self.app.app_id = v;
        }
        if let Some(v) = env("GENPIPE_MODERATION_BUFFER_SIZE") {
            match v.parse() {
                Ok(n) => self.moderation.buffer_size = n,
                Err(_) => tracing::warn!(
                    var = "GENPIPE_MODERATION_BUFFER_SIZE",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("GENPIPE_MODERATION_INTERVAL_MS") {
            match v.parse() {
                Ok(n) => self.moderation.check_interval_ms = n,
                Err(_) => tracing::warn!(
                    var = "GENPIPE_MODERATION_INTERVAL_MS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    /// Worker settings for the default moderation factory.
    pub fn moderation_settings(&self) -> ModerationSettings {
        ModerationSettings {
            buffer_size: self.moderation.buffer_size,
            check_interval: Duration::from_millis(self.moderation.check_interval_ms),
        }
    }
}

// ── Sections ────────────────────────────────────────────────────

/// Message database settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path (`":memory:"` for a throwaway database).
    pub path: String,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "genpipe.db".to_owned(),
            max_connections: 5,
        }
    }
}

/// Output moderation worker tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// New characters to buffer between background checks.
    pub buffer_size: usize,
    /// Pause between background checks, in milliseconds.
    pub check_interval_ms: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            check_interval_ms: 1_000,
        }
    }
}

/// Queue listener timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Idle seconds before a ping is emitted.
    pub ping_interval_secs: u64,
    /// Seconds before listening stops with a timeout.
    pub listen_timeout_secs: u64,
}

impl QueueConfig {
    /// Ping interval as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Listen timeout as a [`Duration`].
    pub fn listen_timeout(&self) -> Duration {
        Duration::from_secs(self.listen_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 10,
            listen_timeout_secs: 600,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for JSON log files; console only when unset.
    pub logs_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            logs_dir: None,
        }
    }
}

/// Resolve the per-user state directory (`~/.genpipe/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".genpipe"))
}
