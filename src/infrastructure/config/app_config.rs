//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::{FetchEngineConfig, PersistConfig, default_persist_dir};
use crate::infrastructure::image::{
    CacheManagerConfig, DEFAULT_MAX_CACHE_SIZE, DEFAULT_MEMORY_BUDGET,
};

const APP_NAME: &str = "pictor";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, from TOML with CLI overrides.
#[derive(Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Cache tiers.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Network fetches.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Background persist tasks.
    #[serde(default)]
    pub persist: PersistSettings,
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Byte budget for decoded images in memory.
    #[serde(default = "default_memory_bytes")]
    pub memory_bytes: usize,

    /// Byte budget for the disk cache.
    #[serde(default = "default_disk_bytes")]
    pub disk_bytes: u64,

    /// Disk cache directory. Platform cache dir when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_bytes: default_memory_bytes(),
            disk_bytes: default_disk_bytes(),
            dir: None,
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum concurrent downloads.
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            user_agent: default_user_agent(),
        }
    }
}

/// Persist configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistSettings {
    /// Destination directory. User pictures dir when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Number of concurrent persist workers.
    #[serde(default = "default_persist_workers")]
    pub workers: usize,
}

impl Default for PersistSettings {
    fn default() -> Self {
        Self {
            dir: None,
            workers: default_persist_workers(),
        }
    }
}

const fn default_memory_bytes() -> usize {
    DEFAULT_MEMORY_BUDGET
}

const fn default_disk_bytes() -> u64 {
    DEFAULT_MAX_CACHE_SIZE
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_concurrent_downloads() -> usize {
    4
}

fn default_user_agent() -> String {
    format!("{APP_NAME}/{}", crate::VERSION)
}

const fn default_persist_workers() -> usize {
    2
}

use super::args::CliArgs;

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(dir) = &args.cache_dir {
            self.cache.dir = Some(dir.clone());
        }
        if let Some(timeout) = args.timeout_secs {
            self.network.timeout_secs = timeout;
        }
    }

    /// Cache tier sizing.
    #[must_use]
    pub fn cache_manager_config(&self) -> CacheManagerConfig {
        CacheManagerConfig {
            memory_bytes: self.cache.memory_bytes,
            disk_bytes: self.cache.disk_bytes,
            disk_dir: self.cache.dir.clone(),
        }
    }

    /// Fetch engine settings.
    #[must_use]
    pub const fn fetch_engine_config(&self) -> FetchEngineConfig {
        FetchEngineConfig {
            max_concurrent_downloads: self.network.max_concurrent_downloads,
        }
    }

    /// Persist pool settings.
    #[must_use]
    pub fn persist_config(&self) -> PersistConfig {
        PersistConfig {
            dir: self.persist.dir.clone().unwrap_or_else(default_persist_dir),
            workers: self.persist.workers,
        }
    }

    /// Network request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs)
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("pictor.log"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            cache: CacheConfig::default(),
            network: NetworkConfig::default(),
            persist: PersistSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
            log_level = "debug"

            [cache]
            memory_bytes = 1048576
            dir = "/tmp/pictor-cache"

            [persist]
            workers = 5
        "#;

        let config: AppConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.cache.memory_bytes, 1_048_576);
        assert_eq!(config.cache.disk_bytes, DEFAULT_MAX_CACHE_SIZE);
        assert_eq!(config.cache.dir, Some(PathBuf::from("/tmp/pictor-cache")));
        assert_eq!(config.network.timeout_secs, 30);
        assert_eq!(config.persist.workers, 5);
        assert!(config.persist.dir.is_none());
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.cache.memory_bytes, DEFAULT_MEMORY_BUDGET);
        assert_eq!(config.network.max_concurrent_downloads, 4);
        assert!(config.network.user_agent.starts_with("pictor/"));
        assert_eq!(config.fetch_engine_config().max_concurrent_downloads, 4);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let text = toml::to_string_pretty(&AppConfig::default()).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.cache.disk_bytes, DEFAULT_MAX_CACHE_SIZE);
        assert_eq!(parsed.persist.workers, 2);
    }

    #[test]
    fn test_cli_overrides_config() {
        let mut config = AppConfig::default();
        let args = CliArgs::parse_from([
            "pictor",
            "--log-level",
            "trace",
            "--cache-dir",
            "/var/cache/pictor",
            "--timeout-secs",
            "5",
            "clear-cache",
        ]);

        config.merge_with_args(&args);

        assert_eq!(config.log_level, LogLevel::Trace);
        assert_eq!(
            config.cache_manager_config().disk_dir,
            Some(PathBuf::from("/var/cache/pictor"))
        );
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }
}
