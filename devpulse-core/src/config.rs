//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/devpulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/devpulse/` (~/.config/devpulse/)
//! - Cache: `$XDG_CACHE_HOME/devpulse/` (~/.cache/devpulse/)
//! - State/Logs: `$XDG_STATE_HOME/devpulse/` (~/.local/state/devpulse/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable consulted when `azure.token` is not set in the file.
pub const TOKEN_ENV_VAR: &str = "DEVPULSE_TOKEN";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_CACHE_HOME or ~/.cache
fn xdg_cache_home() -> PathBuf {
    std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".cache"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Remote API connection and the projects to analyse
    #[serde(default)]
    pub azure: AzureConfig,

    /// Lookback window and pagination
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Disk cache location and time-to-live
    #[serde(default)]
    pub cache: CacheConfig,

    /// Work-item hierarchy query (optional)
    #[serde(default)]
    pub work_items: WorkItemsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Azure DevOps connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct AzureConfig {
    /// Base URL including trailing slash, e.g. `https://dev.azure.com/`
    pub host: Option<String>,
    /// Personal access token (can also use `DEVPULSE_TOKEN`)
    pub token: Option<String>,
    /// Projects analysed by a default run
    #[serde(default)]
    pub projects: Vec<ProjectRef>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Max retry attempts for throttled (429) or 5xx responses
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            host: None,
            token: None,
            projects: vec![],
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

/// A `(collection, project)` pair.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    pub collection: String,
    pub project: String,
}

impl std::fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.project)
    }
}

impl AzureConfig {
    /// Token from config, falling back to the environment.
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
            .filter(|t| !t.is_empty())
    }

    /// Host with a guaranteed trailing slash.
    pub fn base_url(&self) -> Option<String> {
        self.host.as_ref().map(|h| {
            if h.ends_with('/') {
                h.clone()
            } else {
                format!("{}/", h)
            }
        })
    }
}

/// Lookback window and pagination settings
#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// How many days of history to analyse
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// `$top` sent with every paginated request
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            page_size: default_page_size(),
        }
    }
}

impl AnalysisConfig {
    /// Lookback window as a chrono duration.
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.lookback_days))
    }
}

fn default_lookback_days() -> u32 {
    90
}

fn default_page_size() -> u32 {
    1000
}

/// Disk cache settings
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Override for the cache directory
    pub dir: Option<PathBuf>,

    /// Hours a completed fetch keeps the whole cache valid
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl CacheConfig {
    /// Cache TTL as a chrono duration.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours as i64)
    }

    /// Configured directory or the XDG default.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(Config::cache_dir)
    }
}

fn default_ttl_hours() -> u64 {
    12
}

/// Work-item hierarchy settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WorkItemsConfig {
    /// Id of a saved hierarchical (tree) query. Work-item analysis is
    /// skipped when unset.
    pub query_id: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path, or defaults when there is
    /// no config file. Runs before logging is set up, so it doesn't log.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Check that everything a network run needs is present.
    pub fn validate(&self) -> Result<()> {
        if self.azure.host.is_none() {
            return Err(Error::Config("azure.host is required".to_string()));
        }
        if self.azure.resolved_token().is_none() {
            return Err(Error::Config(format!(
                "azure.token is required (or set {})",
                TOKEN_ENV_VAR
            )));
        }
        if self.analysis.page_size == 0 {
            return Err(Error::Config(
                "analysis.page_size must be greater than 0".to_string(),
            ));
        }
        if self.analysis.lookback_days == 0 {
            return Err(Error::Config(
                "analysis.lookback_days must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/devpulse/config.toml` (~/.config/devpulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("devpulse").join("config.toml")
    }

    /// Returns the default cache directory
    ///
    /// `$XDG_CACHE_HOME/devpulse/` (~/.cache/devpulse/)
    pub fn cache_dir() -> PathBuf {
        xdg_cache_home().join("devpulse")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/devpulse/` (~/.local/state/devpulse/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("devpulse")
    }
}
