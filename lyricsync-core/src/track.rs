use serde::{Deserialize, Serialize};

/// Delimiter used when a track has more than one artist
pub const ARTIST_DELIMITER: &str = ", ";

/// Language assigned to lyrics when classification fails
pub const DEFAULT_LANGUAGE: &str = "english";

/// A saved track from the user's library
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Catalog ID (unique key)
    pub spotify_id: String,
    /// Artist names joined with `", "`
    pub artist: String,
    /// Track title
    pub name: String,
    #[serde(default)]
    pub album_name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub preview_url: String,
    /// Lyrics text, empty until fetched
    #[serde(default)]
    pub lyrics: String,
    /// Whether lyrics were successfully obtained
    #[serde(default)]
    pub loaded: bool,
    /// Consecutive lyric fetch/save failures
    #[serde(default)]
    pub lyrics_import_error_count: u32,
    /// Classified language of the lyrics
    #[serde(default)]
    pub language: String,
}

impl Track {
    /// Create a new track without lyrics
    pub fn new(
        spotify_id: impl Into<String>,
        artist: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            spotify_id: spotify_id.into(),
            artist: artist.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set album name
    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album_name = album.into();
        self
    }

    /// Set the failure counter
    #[must_use]
    pub const fn with_error_count(mut self, count: u32) -> Self {
        self.lyrics_import_error_count = count;
        self
    }

    /// First listed artist, used for provider lookups
    #[must_use]
    pub fn primary_artist(&self) -> &str {
        self.artist
            .split(ARTIST_DELIMITER)
            .next()
            .unwrap_or(&self.artist)
    }

    /// Store fetched lyrics on the track
    pub fn set_lyrics(&mut self, lyrics: String, language: Option<String>) {
        self.lyrics = lyrics;
        self.loaded = true;
        self.language = language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
    }

    /// Whether a bulk sync should still try this track
    #[must_use]
    pub const fn is_sync_eligible(&self, max_errors: u32) -> bool {
        !self.loaded && self.lyrics_import_error_count < max_errors
    }

    pub fn record_import_failure(&mut self) {
        self.lyrics_import_error_count = self.lyrics_import_error_count.saturating_add(1);
    }

    pub fn reset_import_errors(&mut self) {
        self.lyrics_import_error_count = 0;
    }
}
