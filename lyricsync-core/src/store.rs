use crate::error::Result;
use crate::track::Track;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// Default number of failed imports after which a track is skipped by bulk syncs
pub const DEFAULT_MAX_LYRICS_IMPORT_ERRORS: u32 = 3;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tracks (
    spotify_id TEXT PRIMARY KEY,
    artist TEXT NOT NULL,
    name TEXT NOT NULL,
    album_name TEXT NOT NULL DEFAULT '',
    image_url TEXT NOT NULL DEFAULT '',
    preview_url TEXT NOT NULL DEFAULT '',
    lyrics TEXT NOT NULL DEFAULT '',
    loaded INTEGER NOT NULL DEFAULT 0,
    lyrics_import_error_count INTEGER NOT NULL DEFAULT 0,
    language TEXT NOT NULL DEFAULT '',
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tracks_loaded ON tracks(loaded, lyrics_import_error_count);
";

const SELECT_TRACK: &str = r"
    SELECT spotify_id, artist, name, album_name, image_url, preview_url,
           lyrics, loaded, lyrics_import_error_count, language
    FROM tracks
";

/// Persistent storage for library tracks
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// Tracks without lyrics that have not yet reached the failure threshold
    async fn tracks_without_lyrics_error(&self) -> Result<Vec<Track>>;

    /// Look up a single track by its catalog ID
    async fn find_track(&self, spotify_id: &str) -> Result<Option<Track>>;

    /// Insert or update a track keyed by its catalog ID
    async fn save(&self, track: &Track) -> Result<()>;
}

fn track_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Track> {
    Ok(Track {
        spotify_id: row.get(0)?,
        artist: row.get(1)?,
        name: row.get(2)?,
        album_name: row.get(3)?,
        image_url: row.get(4)?,
        preview_url: row.get(5)?,
        lyrics: row.get(6)?,
        loaded: row.get(7)?,
        lyrics_import_error_count: row.get(8)?,
        language: row.get(9)?,
    })
}

/// SQLite-backed track store
pub struct SqliteTrackStore {
    conn: Connection,
    max_lyrics_import_errors: u32,
}

impl SqliteTrackStore {
    /// Open the library at the default location
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or opened.
    pub async fn new(max_lyrics_import_errors: u32) -> Result<Self> {
        let path = crate::paths::library_db_path();
        Self::open(&path, max_lyrics_import_errors).await
    }

    /// Open a library database at a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: &Path, max_lyrics_import_errors: u32) -> Result<Self> {
        info!("Opening track database at {:?}", path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).await?;
        conn.call(|conn| {
            conn.execute_batch(SCHEMA_SQL)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            Ok(())
        })
        .await?;

        info!("Track database initialized");
        Ok(Self {
            conn,
            max_lyrics_import_errors,
        })
    }

    /// Open a throwaway in-memory database
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn open_in_memory(max_lyrics_import_errors: u32) -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        conn.call(|conn| {
            conn.execute_batch(SCHEMA_SQL)?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            max_lyrics_import_errors,
        })
    }

    #[must_use]
    pub const fn max_lyrics_import_errors(&self) -> u32 {
        self.max_lyrics_import_errors
    }

    async fn find_where(&self, filter: &'static str, threshold: Option<u32>) -> Result<Vec<Track>> {
        self.conn
            .call(move |conn| {
                let sql = format!("{SELECT_TRACK} WHERE {filter} ORDER BY artist, name");
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = match threshold {
                    Some(threshold) => stmt.query_map(rusqlite::params![threshold], track_from_row)?,
                    None => stmt.query_map([], track_from_row)?,
                };
                let tracks = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(tracks)
            })
            .await
            .map_err(Into::into)
    }

    async fn count_where(&self, filter: &'static str) -> Result<u64> {
        self.conn
            .call(move |conn| {
                let sql = format!("SELECT COUNT(*) FROM tracks WHERE {filter}");
                let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
                Ok(u64::try_from(count).unwrap_or_default())
            })
            .await
            .map_err(Into::into)
    }

    /// All tracks that do not have lyrics yet, regardless of failures
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn tracks_without_lyrics(&self) -> Result<Vec<Track>> {
        self.find_where("loaded = 0", None).await
    }

    /// Tracks excluded from bulk syncs after too many failed imports
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn tracks_with_lyrics_error(&self) -> Result<Vec<Track>> {
        self.find_where(
            "lyrics_import_error_count >= ?1",
            Some(self.max_lyrics_import_errors),
        )
        .await
    }

    /// Number of tracks in the library
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<u64> {
        self.count_where("1 = 1").await
    }

    /// Number of tracks with lyrics
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_with_lyrics(&self) -> Result<u64> {
        self.count_where("loaded = 1").await
    }

    /// Insert tracks or refresh their catalog metadata, keeping lyrics state intact
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn upsert_metadata(&self, tracks: Vec<Track>) -> Result<usize> {
        let now = Utc::now().timestamp();
        info!("Importing {} tracks into the library", tracks.len());

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        r"
                        INSERT INTO tracks (spotify_id, artist, name, album_name, image_url, preview_url, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        ON CONFLICT(spotify_id) DO UPDATE SET
                            artist = excluded.artist,
                            name = excluded.name,
                            album_name = excluded.album_name,
                            image_url = excluded.image_url,
                            preview_url = excluded.preview_url,
                            updated_at = excluded.updated_at
                    ",
                    )?;
                    for track in &tracks {
                        stmt.execute(rusqlite::params![
                            track.spotify_id,
                            track.artist,
                            track.name,
                            track.album_name,
                            track.image_url,
                            track.preview_url,
                            now
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(tracks.len())
            })
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl TrackStore for SqliteTrackStore {
    async fn tracks_without_lyrics_error(&self) -> Result<Vec<Track>> {
        self.find_where(
            "loaded = 0 AND lyrics_import_error_count < ?1",
            Some(self.max_lyrics_import_errors),
        )
        .await
    }

    async fn find_track(&self, spotify_id: &str) -> Result<Option<Track>> {
        let id = spotify_id.to_string();

        self.conn
            .call(move |conn| {
                let sql = format!("{SELECT_TRACK} WHERE spotify_id = ?1");
                let mut stmt = conn.prepare_cached(&sql)?;
                let track = stmt
                    .query_row(rusqlite::params![id], track_from_row)
                    .optional()?;
                Ok(track)
            })
            .await
            .map_err(Into::into)
    }

    async fn save(&self, track: &Track) -> Result<()> {
        debug!(
            "Saving track {} ({} - {}, loaded: {}, errors: {})",
            track.spotify_id, track.artist, track.name, track.loaded, track.lyrics_import_error_count
        );

        let track = track.clone();
        let now = Utc::now().timestamp();

        self.conn
            .call(move |conn| {
                // Lyrics are only written once loaded; language only once classified
                let lyrics = if track.loaded { track.lyrics } else { String::new() };
                conn.execute(
                    r"
                    INSERT INTO tracks (spotify_id, artist, name, album_name, image_url, preview_url,
                                        lyrics, loaded, lyrics_import_error_count, language, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    ON CONFLICT(spotify_id) DO UPDATE SET
                        artist = excluded.artist,
                        name = excluded.name,
                        album_name = excluded.album_name,
                        image_url = excluded.image_url,
                        preview_url = excluded.preview_url,
                        lyrics_import_error_count = excluded.lyrics_import_error_count,
                        lyrics = CASE WHEN excluded.loaded THEN excluded.lyrics ELSE tracks.lyrics END,
                        loaded = CASE WHEN excluded.loaded THEN 1 ELSE tracks.loaded END,
                        language = CASE WHEN excluded.language <> '' THEN excluded.language ELSE tracks.language END,
                        updated_at = excluded.updated_at
                ",
                    rusqlite::params![
                        track.spotify_id,
                        track.artist,
                        track.name,
                        track.album_name,
                        track.image_url,
                        track.preview_url,
                        lyrics,
                        track.loaded,
                        track.lyrics_import_error_count,
                        track.language,
                        now
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}
