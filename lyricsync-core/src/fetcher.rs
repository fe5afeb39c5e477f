//! Lyrics fetcher with a bounded worker pool for batches of tracks.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::provider::{LanguageDetector, LyricsProvider};
use crate::track::Track;

/// Default number of concurrent lyric lookups
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Outcome of fetching lyrics for one track
#[derive(Debug)]
pub struct FetchResult {
    pub track: Track,
    pub outcome: Result<(), CoreError>,
}

impl FetchResult {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Fetches lyrics for single tracks or whole batches
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch lyrics for one track, updating it in place on success
    async fn fetch(&self, track: &mut Track) -> Result<(), CoreError>;

    /// Start fetching lyrics for all `tracks` and return a stream of results.
    ///
    /// The stream yields exactly one result per track in completion order and
    /// closes once every track has been processed.
    fn fetch_all(&self, tracks: Vec<Track>) -> Result<mpsc::Receiver<FetchResult>, CoreError>;
}

/// Provider and classifier shared by all workers
#[derive(Clone)]
struct TrackLookup {
    provider: Arc<dyn LyricsProvider>,
    detector: Arc<dyn LanguageDetector>,
}

impl TrackLookup {
    async fn fetch(&self, track: &mut Track) -> Result<(), CoreError> {
        let artist = track.primary_artist().to_string();
        let lyrics = self.provider.search(&artist, &track.name).await?;

        if lyrics.trim().is_empty() {
            return Err(CoreError::LyricsNotFound {
                track: track.name.clone(),
                artist,
            });
        }

        let language = match self.detector.detect(&lyrics) {
            Ok(language) => Some(language),
            Err(e) => {
                debug!(
                    "Could not detect language of {} - {} ({}), falling back to default",
                    artist, track.name, e
                );
                None
            }
        };

        track.set_lyrics(lyrics, language);
        Ok(())
    }
}

/// Fetcher that spreads batches across a fixed number of concurrent workers
#[derive(Clone)]
pub struct AsyncFetcher {
    concurrency: usize,
    lookup: TrackLookup,
}

impl AsyncFetcher {
    /// Create a new fetcher
    ///
    /// # Arguments
    /// * `provider` - Lyrics provider used for every lookup
    /// * `detector` - Language classifier for fetched lyrics
    /// * `concurrency` - Number of workers per batch (at least one)
    pub fn new(
        provider: Arc<dyn LyricsProvider>,
        detector: Arc<dyn LanguageDetector>,
        concurrency: usize,
    ) -> Self {
        Self {
            concurrency: concurrency.max(1),
            lookup: TrackLookup { provider, detector },
        }
    }

    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }
}

#[async_trait]
impl Fetcher for AsyncFetcher {
    async fn fetch(&self, track: &mut Track) -> Result<(), CoreError> {
        self.lookup.fetch(track).await
    }

    fn fetch_all(&self, tracks: Vec<Track>) -> Result<mpsc::Receiver<FetchResult>, CoreError> {
        let handle = Handle::try_current().map_err(|_| CoreError::RuntimeUnavailable)?;

        info!(
            "Fetching lyrics for {} tracks with {} workers",
            tracks.len(),
            self.concurrency
        );

        let (queue_tx, queue_rx) = mpsc::channel::<Track>(self.concurrency);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (results_tx, results_rx) = mpsc::channel(self.concurrency);

        // The result stream closes when the last worker drops its sender
        for worker in 0..self.concurrency {
            let queue = Arc::clone(&queue_rx);
            let results = results_tx.clone();
            let lookup = self.lookup.clone();

            handle.spawn(async move {
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some(mut track) = next else {
                        break;
                    };

                    let outcome = lookup.fetch(&mut track).await;
                    if let Err(ref e) = outcome {
                        debug!("Worker {} failed {} - {}: {}", worker, track.artist, track.name, e);
                    }

                    if results.send(FetchResult { track, outcome }).await.is_err() {
                        warn!("Lyrics result stream dropped, stopping worker {}", worker);
                        break;
                    }
                }
                debug!("Lyrics worker {} finished", worker);
            });
        }
        drop(results_tx);

        handle.spawn(async move {
            for track in tracks {
                if queue_tx.send(track).await.is_err() {
                    break;
                }
            }
        });

        Ok(results_rx)
    }
}
