pub mod config;
pub mod error;
pub mod fetcher;
pub mod import;
pub mod paths;
pub mod progress;
pub mod provider;
pub mod store;
pub mod syncer;
pub mod track;

pub use config::{
    DatabaseConfig, LoggingConfig, LrclibConfig, LyricsConfig, LyricsProviderType, LyricsyncConfig,
    ProvidersConfig, SyncConfig,
};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
pub use error::CoreError;
pub use fetcher::{AsyncFetcher, FetchResult, Fetcher, DEFAULT_CONCURRENCY};
pub use import::import_track;
pub use paths::{
    config_dir, config_path, library_db_path, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME,
    LIBRARY_DB_FILE_NAME, LOG_FILE_NAME,
};
pub use progress::{SyncLogEntry, SyncProgress, SyncStatus, SyncSummary};
pub use provider::{FallbackDetector, LanguageDetector, LyricsProvider, ProviderChain};
pub use store::{SqliteTrackStore, TrackStore, DEFAULT_MAX_LYRICS_IMPORT_ERRORS};
pub use syncer::Syncer;
pub use track::{Track, ARTIST_DELIMITER, DEFAULT_LANGUAGE};
