use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Sync admission errors
    #[error("Lyrics sync already started, try again later")]
    Busy,

    #[error("Failed to select tracks for lyrics sync: {0}")]
    Selection(#[source] Box<CoreError>),

    #[error("Lyrics fetching requires a running tokio runtime")]
    RuntimeUnavailable,

    // Configuration errors
    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Lyrics errors
    #[error("Lyrics not found for track: {track} by {artist}")]
    LyricsNotFound { track: String, artist: String },

    #[error("Lyrics provider {provider} failed: {reason}")]
    LyricsProviderFailed { provider: String, reason: String },

    #[error("Could not detect language of lyrics")]
    UnknownLanguage,

    // Track store errors
    #[error("Track not found: {id}")]
    TrackNotFound { id: String },

    #[error("Track database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // Network errors
    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest_middleware::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Wrap a store failure raised while selecting tracks for a sync run
    #[must_use]
    pub fn selection(source: Self) -> Self {
        Self::Selection(Box::new(source))
    }

    /// Whether this error rejected a sync run because another one is still in flight
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_message() {
        assert_eq!(
            CoreError::Busy.to_string(),
            "Lyrics sync already started, try again later"
        );
        assert!(CoreError::Busy.is_busy());
    }

    #[test]
    fn test_selection_wraps_source() {
        let err = CoreError::selection(CoreError::TrackNotFound { id: "42".into() });
        assert!(!err.is_busy());
        assert_eq!(
            err.to_string(),
            "Failed to select tracks for lyrics sync: Track not found: 42"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
