//! Bootstrap configuration loading and config file resolution
//!
//! The TOML file carries bootstrap concerns only: where the database lives,
//! where the composite score config lives, logging, and the tunables of the
//! scoring runtime. Every field has a built-in default so a missing file
//! still yields a usable configuration.
//!
//! # Config File Priority
//!
//! 1. Command-line argument (highest priority)
//! 2. `BNEWS_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/bnews/config.toml` on Linux)
//! 4. Built-in defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the bootstrap TOML file
pub const CONFIG_ENV_VAR: &str = "BNEWS_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Path to the composite score JSON config
    #[serde(default = "default_composite_config_path")]
    pub composite_config_path: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// SQLite connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite busy_timeout applied to every connection
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Bounded retry for lock-contended writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Scoring client timeouts and endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Timeout for a full per-model scoring call
    #[serde(default = "default_main_timeout_ms")]
    pub main_timeout_ms: u64,

    /// Timeout for a health-check trial call (must be shorter than main)
    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,

    /// Endpoint used for models without their own url
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

/// Progress map retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Age after which Complete/Error entries are dropped
    #[serde(default = "default_terminal_ttl_secs")]
    pub terminal_ttl_secs: u64,

    /// Age after which entries stuck in Queued/InProgress are dropped
    #[serde(default = "default_stale_ttl_secs")]
    pub stale_ttl_secs: u64,
}

/// Composite score read cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("bnews.db")
}

fn default_composite_config_path() -> PathBuf {
    PathBuf::from("configs/composite_score_config.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_max_connections() -> u32 {
    10
}

fn default_retry_attempts() -> u32 {
    8
}

fn default_retry_base_delay_ms() -> u64 {
    50
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_main_timeout_ms() -> u64 {
    30_000
}

fn default_health_check_timeout_ms() -> u64 {
    2_000
}

fn default_base_url() -> String {
    "http://127.0.0.1:8090/analyze".to_string()
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_terminal_ttl_secs() -> u64 {
    300
}

fn default_stale_ttl_secs() -> u64 {
    1800
}

fn default_cache_ttl_secs() -> u64 {
    30
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            composite_config_path: default_composite_config_path(),
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
            retry: RetryConfig::default(),
            scoring: ScoringConfig::default(),
            progress: ProgressConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            main_timeout_ms: default_main_timeout_ms(),
            health_check_timeout_ms: default_health_check_timeout_ms(),
            base_url: default_base_url(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval_secs(),
            terminal_ttl_secs: default_terminal_ttl_secs(),
            stale_ttl_secs: default_stale_ttl_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl ScoringConfig {
    pub fn main_timeout(&self) -> Duration {
        Duration::from_millis(self.main_timeout_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }
}

impl ProgressConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn terminal_ttl(&self) -> Duration {
        Duration::from_secs(self.terminal_ttl_secs)
    }

    pub fn stale_ttl(&self) -> Duration {
        Duration::from_secs(self.stale_ttl_secs)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl TomlConfig {
    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.scoring.health_check_timeout_ms >= self.scoring.main_timeout_ms {
            return Err(Error::Config(format!(
                "scoring.health_check_timeout_ms ({}) must be shorter than scoring.main_timeout_ms ({})",
                self.scoring.health_check_timeout_ms, self.scoring.main_timeout_ms
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.progress.cleanup_interval_secs == 0 {
            return Err(Error::Config(
                "progress.cleanup_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::ConfigNotFound(path.to_path_buf()),
        _ => Error::Config(format!("Failed to read config file {}: {}", path.display(), e)),
    })?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Write a TOML config file (used by tests and the `init-config` command)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize TOML: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Resolve the bootstrap config file path following the documented priority
///
/// Returns `None` when no file was given and none exists at the platform
/// location; callers then fall back to `TomlConfig::default()`.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("bnews").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load the bootstrap configuration, degrading to defaults when no file exists
///
/// An explicitly named file that is missing or malformed is an error; only
/// the "nothing configured anywhere" case falls back silently.
pub fn load_bootstrap_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => {
            let config = load_toml_config(&path)?;
            info!("Loaded bootstrap config from {}", path.display());
            Ok(config)
        }
        None => {
            warn!("No bootstrap config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Get OS-dependent default data folder
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("bnews"))
        .unwrap_or_else(|| PathBuf::from("./bnews_data"))
}
