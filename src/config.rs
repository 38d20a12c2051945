//! Configuration file parser for ~/.config/rssagg/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos. `DATABASE_PATH` in the environment overrides the
//! file's `database_path`.
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{DEFAULT_MAX_FEED_SIZE, DEFAULT_REQUEST_TIMEOUT};
use crate::scraper::ScraperSettings;

/// Environment variable overriding `database_path`
pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Relative paths resolve against the working
    /// directory.
    pub database_path: PathBuf,

    /// Feeds fetched in parallel per scrape cycle. Must be at least 1.
    pub concurrency: usize,

    /// Seconds between scrape cycle starts. 0 runs cycles back to back.
    pub interval_secs: u64,

    /// Per-feed HTTP timeout in seconds. Must be at least 1.
    pub request_timeout_secs: u64,

    /// Largest feed document accepted, in bytes.
    pub max_feed_size_bytes: usize,

    /// Items persisted from a single feed document per cycle.
    pub max_items_per_feed: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("rssagg.db"),
            concurrency: 10,
            interval_secs: 60,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_feed_size_bytes: DEFAULT_MAX_FEED_SIZE,
            max_items_per_feed: 100,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "database_path",
        "concurrency",
        "interval_secs",
        "request_timeout_secs",
        "max_feed_size_bytes",
        "max_items_per_feed",
    ];

    /// Default config location: `$HOME/.config/rssagg/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("rssagg")
                .join("config.toml")
        })
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate TOML text. Blank input yields the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DATABASE_PATH` from the environment, if set and non-empty.
    pub fn apply_env(&mut self) {
        if let Some(path) = std::env::var_os(DATABASE_PATH_ENV).filter(|p| !p.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.max_feed_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_feed_size_bytes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Engine settings derived from this config.
    pub fn scraper_settings(&self) -> Result<ScraperSettings, ConfigError> {
        let concurrency = NonZeroUsize::new(self.concurrency)
            .ok_or_else(|| ConfigError::Invalid("concurrency must be at least 1".into()))?;

        Ok(ScraperSettings {
            concurrency,
            interval: Duration::from_secs(self.interval_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_feed_size: self.max_feed_size_bytes,
            max_items_per_feed: self.max_items_per_feed,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database_path, PathBuf::from("rssagg.db"));
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.max_items_per_feed, 100);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/rssagg_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_whitespace_only_returns_default() {
        assert_eq!(Config::from_toml("   \n  \n").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let config = Config::from_toml("concurrency = 3\n").unwrap();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.interval_secs, 60);
    }

    #[test]
    fn test_full_config_file() {
        let dir = std::env::temp_dir().join("rssagg_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
database_path = "/var/lib/rssagg/feeds.db"
concurrency = 4
interval_secs = 0
request_timeout_secs = 30
max_feed_size_bytes = 2048
max_items_per_feed = 25
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/rssagg/feeds.db"));
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.interval_secs, 0);
        assert_eq!(config.max_items_per_feed, 25);

        let settings = config.scraper_settings().unwrap();
        assert_eq!(settings.concurrency.get(), 4);
        assert!(settings.interval.is_zero());
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.max_feed_size, 2048);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::from_toml("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::from_toml("concurrency = \"many\"\n").is_err());
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::from_toml("concurrency = 2\ntotally_fake_key = true\n").unwrap();
        assert_eq!(config.concurrency, 2);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = Config::from_toml("concurrency = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = Config::from_toml("request_timeout_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("rssagg_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));

        std::fs::remove_dir_all(&dir).ok();
    }
}
