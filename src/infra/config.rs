//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/tracker.toml
//!
//! API credentials come from the environment (STM_CLIENT_ID / STM_CLIENT_SECRET)
//! and override anything in the file. Validation runs once at startup; missing
//! credentials are fatal there, never mid-run.

use crate::error::ConfigError;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Normally left empty here and supplied via STM_CLIENT_ID
    #[serde(default)]
    pub client_id: Option<String>,
    /// Normally left empty here and supplied via STM_CLIENT_SECRET
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_url: default_auth_url(),
            timeout_secs: default_timeout_secs(),
            client_id: None,
            client_secret: None,
        }
    }
}

fn default_base_url() -> String {
    "https://api.montevideo.gub.uy/api/transportepublico".to_string()
}

fn default_auth_url() -> String {
    "https://mvdapi-auth.montevideo.gub.uy/token".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_stop_id")]
    pub stop_id: i64,
    #[serde(default = "default_lines")]
    pub lines: Vec<String>,
    /// Empty = all variants of the monitored lines
    #[serde(default)]
    pub line_variant_ids: Vec<String>,
    #[serde(default = "default_threshold_meters")]
    pub proximity_threshold_meters: f64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stop_id: default_stop_id(),
            lines: default_lines(),
            line_variant_ids: Vec::new(),
            proximity_threshold_meters: default_threshold_meters(),
            poll_interval_secs: default_poll_interval_secs(),
            cooldown_minutes: default_cooldown_minutes(),
        }
    }
}

fn default_stop_id() -> i64 {
    2071
}

fn default_lines() -> Vec<String> {
    ["147", "148", "149", "151", "157", "174"].iter().map(|s| s.to_string()).collect()
}

fn default_threshold_meters() -> f64 {
    100.0
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_cooldown_minutes() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the stop cache and the passage log
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    api_base_url: String,
    auth_url: String,
    http_timeout_secs: u64,
    client_id: String,
    client_secret: String,
    stop_id: i64,
    lines: Vec<String>,
    line_variant_ids: Vec<String>,
    proximity_threshold_meters: f64,
    poll_interval_secs: u64,
    cooldown_minutes: u64,
    data_dir: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, source: &str) -> Self {
        Self {
            api_base_url: toml_config.api.base_url,
            auth_url: toml_config.api.auth_url,
            http_timeout_secs: toml_config.api.timeout_secs,
            client_id: toml_config.api.client_id.unwrap_or_default(),
            client_secret: toml_config.api.client_secret.unwrap_or_default(),
            stop_id: toml_config.monitor.stop_id,
            lines: toml_config.monitor.lines,
            line_variant_ids: toml_config.monitor.line_variant_ids,
            proximity_threshold_meters: toml_config.monitor.proximity_threshold_meters,
            poll_interval_secs: toml_config.monitor.poll_interval_secs,
            cooldown_minutes: toml_config.monitor.cooldown_minutes,
            data_dir: toml_config.store.data_dir,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: source.to_string(),
        }
    }

    /// Determine config file path from the CLI override or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/tracker.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults,
    /// then lets the environment supply/override credentials
    pub fn load(cli_path: Option<&str>) -> Self {
        let config_path = Self::resolve_config_path(cli_path);

        let mut config = match Self::from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        };
        config.apply_env_credentials();
        config
    }

    fn apply_env_credentials(&mut self) {
        if let Ok(id) = env::var("STM_CLIENT_ID") {
            self.client_id = id.trim().to_string();
        }
        if let Ok(secret) = env::var("STM_CLIENT_SECRET") {
            self.client_secret = secret.trim().to_string();
        }
    }

    /// Startup validation. Everything here is fatal; nothing is checked again
    /// at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::MissingCredential("STM_CLIENT_ID"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(ConfigError::MissingCredential("STM_CLIENT_SECRET"));
        }
        if self.lines.is_empty() {
            return Err(ConfigError::Invalid {
                field: "monitor.lines",
                reason: "at least one line is required".to_string(),
            });
        }
        if !(self.proximity_threshold_meters > 0.0) {
            return Err(ConfigError::Invalid {
                field: "monitor.proximity_threshold_meters",
                reason: format!("must be positive, got {}", self.proximity_threshold_meters),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "monitor.poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cooldown_minutes == 0 {
            return Err(ConfigError::Invalid {
                field: "monitor.cooldown_minutes",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    // Getters for all config fields
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    pub fn http_timeout_secs(&self) -> u64 {
        self.http_timeout_secs
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn stop_id(&self) -> i64 {
        self.stop_id
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_variant_ids(&self) -> &[String] {
        &self.line_variant_ids
    }

    pub fn proximity_threshold_meters(&self) -> f64 {
        self.proximity_threshold_meters
    }

    pub fn poll_interval_secs(&self) -> u64 {
        self.poll_interval_secs
    }

    pub fn cooldown_minutes(&self) -> u64 {
        self.cooldown_minutes
    }

    pub fn data_dir(&self) -> &str {
        &self.data_dir
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set credentials
    #[cfg(test)]
    pub fn with_credentials(mut self, id: &str, secret: &str) -> Self {
        self.client_id = id.to_string();
        self.client_secret = secret.to_string();
        self
    }

    /// Builder method for tests to set the proximity threshold
    #[cfg(test)]
    pub fn with_threshold_meters(mut self, meters: f64) -> Self {
        self.proximity_threshold_meters = meters;
        self
    }

    /// Builder method for tests to set the cooldown window
    #[cfg(test)]
    pub fn with_cooldown_minutes(mut self, minutes: u64) -> Self {
        self.cooldown_minutes = minutes;
        self
    }
}
