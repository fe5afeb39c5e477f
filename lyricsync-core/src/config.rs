use crate::error::{CoreError, Result};
use crate::fetcher::DEFAULT_CONCURRENCY;
use crate::store::DEFAULT_MAX_LYRICS_IMPORT_ERRORS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LyricsyncConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of lyric lookups running at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Failed imports after which bulk syncs skip a track
    #[serde(default = "default_max_lyrics_import_errors")]
    pub max_lyrics_import_errors: u32,
    /// How often the CLI polls sync progress
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

const fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

const fn default_max_lyrics_import_errors() -> u32 {
    DEFAULT_MAX_LYRICS_IMPORT_ERRORS
}

const fn default_poll_interval() -> u64 {
    500
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_lyrics_import_errors: default_max_lyrics_import_errors(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Custom library database location
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(crate::paths::library_db_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Provider priority: providers are tried in order
    #[serde(default = "default_providers")]
    pub providers: Vec<LyricsProviderType>,
}

fn default_providers() -> Vec<LyricsProviderType> {
    vec![LyricsProviderType::Lrclib]
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricsProviderType {
    Lrclib,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub lrclib: LrclibConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LrclibConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Retries for transient HTTP failures of a single request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

const fn default_timeout() -> u64 {
    10
}

const fn default_max_retries() -> u32 {
    3
}

impl Default for LrclibConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to a file in the cache directory
    #[serde(default)]
    pub enabled: bool,
}

impl LyricsyncConfig {
    /// Get the config file path (~/.config/lyricsync/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default location, writing a template on first run
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or is invalid.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Load config from `path`, writing a template first if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or is invalid.
    pub fn load_or_create_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, CONFIG_TEMPLATE)?;
            info!("Created config template at {}", path.display());
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate config file contents
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a value is out of range.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.sync.concurrency == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "sync.concurrency must be at least 1".to_string(),
            });
        }
        if self.sync.max_lyrics_import_errors == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "sync.max_lyrics_import_errors must be at least 1".to_string(),
            });
        }
        if self.lyrics.providers.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "lyrics.providers must list at least one provider".to_string(),
            });
        }
        Ok(())
    }
}

const CONFIG_TEMPLATE: &str = r#"# Lyricsync Configuration
# ~/.config/lyricsync/config.toml

[sync]
# Number of lyric lookups running at the same time
concurrency = 3
# Tracks that failed this many times are skipped by bulk syncs
# (they can still be imported one by one with `lyricsync retry <ID>`)
max_lyrics_import_errors = 3
poll_interval_ms = 500

[database]
# Defaults to ~/.config/lyricsync/library.db
# path = ""

[lyrics]
# Provider priority: providers are tried in order; first result wins
providers = ["lrclib"]

[providers.lrclib]
timeout_secs = 10
max_retries = 3

[logging]
# Also write logs to the cache directory
enabled = false
"#;
