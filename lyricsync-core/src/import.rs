//! Manual lyrics import for a single track.
//!
//! Bypasses the bulk [`Syncer`](crate::syncer::Syncer) and its failure
//! threshold, so tracks excluded from automatic retries can still be fixed.

use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::fetcher::Fetcher;
use crate::store::TrackStore;
use crate::track::Track;

/// Fetch and store lyrics for the track with the given catalog ID.
///
/// Tracks that already have lyrics are returned unchanged.
///
/// # Errors
///
/// Returns [`CoreError::TrackNotFound`] for unknown IDs,
/// [`CoreError::LyricsNotFound`] if no provider has lyrics, or the store's
/// error if the updated track cannot be saved.
pub async fn import_track(
    fetcher: &dyn Fetcher,
    store: &dyn TrackStore,
    spotify_id: &str,
) -> Result<Track> {
    let mut track = store
        .find_track(spotify_id)
        .await?
        .ok_or_else(|| CoreError::TrackNotFound {
            id: spotify_id.to_string(),
        })?;

    if track.loaded {
        info!("Lyrics for {} - {} already imported", track.artist, track.name);
        return Ok(track);
    }

    if let Err(e) = fetcher.fetch(&mut track).await {
        warn!("Manual import of {} - {} failed: {}", track.artist, track.name, e);
        return Err(CoreError::LyricsNotFound {
            track: track.name,
            artist: track.artist,
        });
    }

    track.reset_import_errors();
    store.save(&track).await?;

    info!(
        "Imported lyrics for {} - {} ({})",
        track.artist, track.name, track.language
    );
    Ok(track)
}
