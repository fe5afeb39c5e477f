//! Bulk lyrics synchronization.
//!
//! [`Syncer`] selects every track that still needs lyrics, fans the batch out
//! to a [`Fetcher`] and persists each result as it arrives. Only one run can
//! be in flight at a time; progress is readable from any thread while a run
//! is going.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, Result};
use crate::fetcher::{FetchResult, Fetcher};
use crate::progress::{SyncLogEntry, SyncProgress, SyncSummary};
use crate::store::TrackStore;
use crate::track::Track;

/// Coordinates bulk lyric imports for all eligible tracks
pub struct Syncer {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn TrackStore>,
    slot: Arc<Semaphore>,
    progress: Arc<Mutex<SyncProgress>>,
}

impl Syncer {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<dyn TrackStore>) -> Self {
        Self {
            fetcher,
            store,
            slot: Arc::new(Semaphore::new(1)),
            progress: Arc::new(Mutex::new(SyncProgress::default())),
        }
    }

    /// Start a sync run in the background.
    ///
    /// Returns a receiver that resolves with the run's summary once every
    /// selected track has been processed. Dropping the receiver does not
    /// affect the run.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Selection`] if eligible tracks cannot be loaded and
    /// [`CoreError::Busy`] if a run is already in progress.
    pub async fn sync(&self) -> Result<oneshot::Receiver<SyncSummary>> {
        let tracks = self
            .store
            .tracks_without_lyrics_error()
            .await
            .map_err(CoreError::selection)?;

        let permit = Arc::clone(&self.slot)
            .try_acquire_owned()
            .map_err(|_| CoreError::Busy)?;

        info!("Starting lyrics sync for {} tracks", tracks.len());
        self.progress.lock().start(tracks.len());

        let (done_tx, done_rx) = oneshot::channel();
        let run = SyncRun {
            fetcher: Arc::clone(&self.fetcher),
            store: Arc::clone(&self.store),
            progress: Arc::clone(&self.progress),
        };
        tokio::spawn(run.execute(tracks, permit, done_tx));

        Ok(done_rx)
    }

    /// Whether a run is in progress
    #[must_use]
    pub fn syncing(&self) -> bool {
        self.progress.lock().is_running()
    }

    /// Tracks processed in the current run, or -1 when idle
    #[must_use]
    pub fn synced_tracks(&self) -> i64 {
        self.progress.lock().completed
    }

    #[must_use]
    pub fn total_tracks(&self) -> usize {
        self.progress.lock().total
    }

    #[must_use]
    pub fn tracks_success(&self) -> usize {
        self.progress.lock().success
    }

    #[must_use]
    pub fn tracks_failed(&self) -> usize {
        self.progress.lock().failure
    }

    /// Log of the current run, newest entry first
    #[must_use]
    pub fn logs(&self) -> String {
        self.progress.lock().render_log()
    }

    /// Consistent copy of all counters and log entries
    #[must_use]
    pub fn progress(&self) -> SyncProgress {
        self.progress.lock().clone()
    }
}

/// State handed to the background aggregation task of one run
struct SyncRun {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn TrackStore>,
    progress: Arc<Mutex<SyncProgress>>,
}

impl SyncRun {
    async fn execute(
        self,
        tracks: Vec<Track>,
        permit: OwnedSemaphorePermit,
        done: oneshot::Sender<SyncSummary>,
    ) {
        match self.fetcher.fetch_all(tracks) {
            Ok(results) => self.aggregate(results).await,
            Err(e) => error!("Could not start fetching lyrics: {}", e),
        }

        // Release the slot while holding the lock so pollers never see an
        // idle state that still rejects new runs
        let summary = {
            let mut progress = self.progress.lock();
            let summary = progress.finish();
            drop(permit);
            summary
        };

        info!(
            "Lyrics sync finished: {} of {} tracks imported, {} failed",
            summary.success, summary.total, summary.failure
        );

        if done.send(summary).is_err() {
            debug!("Nobody waiting for lyrics sync completion");
        }
    }

    async fn aggregate(&self, mut results: mpsc::Receiver<FetchResult>) {
        while let Some(FetchResult { mut track, outcome }) = results.recv().await {
            self.progress.lock().track_completed();

            match outcome {
                Ok(()) => track.reset_import_errors(),
                Err(_) => track.record_import_failure(),
            }

            let saved = self.store.save(&track).await;

            let entry = match (outcome, saved) {
                (Err(e), _) => {
                    warn!("{} - {}: {}", track.artist, track.name, e);
                    SyncLogEntry::failure(&track.artist, &track.name, e.to_string())
                }
                (Ok(()), Err(e)) => {
                    track.record_import_failure();
                    warn!("Could not save {} - {}: {}", track.artist, track.name, e);
                    SyncLogEntry::failure(&track.artist, &track.name, e.to_string())
                }
                (Ok(()), Ok(())) => {
                    debug!("Imported lyrics for {} - {}", track.artist, track.name);
                    SyncLogEntry::success(&track.artist, &track.name)
                }
            };

            self.progress.lock().record(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use std::time::Duration;

    mock! {
        pub Store {}

        #[async_trait]
        impl TrackStore for Store {
            async fn tracks_without_lyrics_error(&self) -> Result<Vec<Track>>;
            async fn find_track(&self, spotify_id: &str) -> Result<Option<Track>>;
            async fn save(&self, track: &Track) -> Result<()>;
        }
    }

    mock! {
        pub LyricsFetcher {}

        #[async_trait]
        impl Fetcher for LyricsFetcher {
            async fn fetch(&self, track: &mut Track) -> Result<()>;
            fn fetch_all(&self, tracks: Vec<Track>) -> Result<mpsc::Receiver<FetchResult>>;
        }
    }

    fn tracks(names: &[&str]) -> Vec<Track> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Track::new(i.to_string(), "Artist", *name))
            .collect()
    }

    fn store_returning(tracks: Vec<Track>) -> MockStore {
        let mut store = MockStore::new();
        store
            .expect_tracks_without_lyrics_error()
            .returning(move || Ok(tracks.clone()));
        store
    }

    /// Fetcher whose result stream is fed by the test
    fn fetcher_with_stream() -> (MockLyricsFetcher, mpsc::Sender<FetchResult>) {
        let (tx, rx) = mpsc::channel(16);
        let mut fetcher = MockLyricsFetcher::new();
        fetcher
            .expect_fetch_all()
            .times(1)
            .return_once(move |_| Ok(rx));
        (fetcher, tx)
    }

    fn ok(mut track: Track) -> FetchResult {
        track.set_lyrics("la la la".into(), None);
        FetchResult {
            track,
            outcome: Ok(()),
        }
    }

    fn failed(track: Track) -> FetchResult {
        FetchResult {
            outcome: Err(CoreError::LyricsNotFound {
                track: track.name.clone(),
                artist: track.artist.clone(),
            }),
            track,
        }
    }

    async fn wait(done: oneshot::Receiver<SyncSummary>) -> SyncSummary {
        tokio::time::timeout(Duration::from_secs(1), done)
            .await
            .unwrap()
            .unwrap()
    }

    async fn wait_for(syncer: &Syncer, completed: i64) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while syncer.synced_tracks() < completed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_sync_saves_every_track() {
        let selected = tracks(&["track A", "track B", "track C"]);
        let mut store = store_returning(selected.clone());
        store.expect_save().times(3).returning(|_| Ok(()));
        let (fetcher, tx) = fetcher_with_stream();

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        let done = syncer.sync().await.unwrap();

        for track in selected {
            tx.send(ok(track)).await.unwrap();
        }
        drop(tx);

        let summary = wait(done).await;
        assert_eq!(
            summary,
            SyncSummary {
                total: 3,
                success: 3,
                failure: 0
            }
        );
    }

    #[tokio::test]
    async fn test_second_sync_is_rejected_while_running() {
        let store = store_returning(tracks(&["track A"]));
        let (fetcher, tx) = fetcher_with_stream();

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        let done = syncer.sync().await.unwrap();

        let err = syncer.sync().await.unwrap_err();
        assert!(err.is_busy());
        assert!(syncer.syncing());
        assert_eq!(syncer.total_tracks(), 1);
        assert_eq!(syncer.synced_tracks(), 0);

        drop(tx);
        wait(done).await;
    }

    #[tokio::test]
    async fn test_busy_rejection_leaves_progress_untouched() {
        let selected = tracks(&["track A", "track B"]);
        let mut store = store_returning(selected.clone());
        store.expect_save().returning(|_| Ok(()));
        let (fetcher, tx) = fetcher_with_stream();

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        let done = syncer.sync().await.unwrap();

        tx.send(ok(selected[0].clone())).await.unwrap();
        wait_for(&syncer, 1).await;
        let before = syncer.progress();

        assert!(syncer.sync().await.unwrap_err().is_busy());
        assert_eq!(syncer.progress(), before);

        drop(tx);
        wait(done).await;
    }

    #[tokio::test]
    async fn test_sync_can_run_again_after_completion() {
        let mut store = store_returning(Vec::new());
        store.expect_save().never();
        let mut fetcher = MockLyricsFetcher::new();
        fetcher.expect_fetch_all().times(2).returning(|_| {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        });

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        wait(syncer.sync().await.unwrap()).await;
        wait(syncer.sync().await.unwrap()).await;
        assert!(!syncer.syncing());
    }

    #[tokio::test]
    async fn test_syncing_state() {
        let store = store_returning(tracks(&["track A", "track B", "track C"]));
        let (fetcher, tx) = fetcher_with_stream();

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        assert!(!syncer.syncing());

        let done = syncer.sync().await.unwrap();
        assert!(syncer.syncing());

        drop(tx);
        wait(done).await;
        assert!(!syncer.syncing());
    }

    #[tokio::test]
    async fn test_selection_error_is_returned() {
        let mut store = MockStore::new();
        store
            .expect_tracks_without_lyrics_error()
            .times(1)
            .returning(|| Err(CoreError::TrackNotFound { id: "db".into() }));
        let mut fetcher = MockLyricsFetcher::new();
        fetcher.expect_fetch_all().never();

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        let err = syncer.sync().await.unwrap_err();

        assert!(matches!(err, CoreError::Selection(_)));
        assert!(!syncer.syncing());
    }

    #[tokio::test]
    async fn test_total_tracks() {
        let store = store_returning(tracks(&["track A", "track B"]));
        let (fetcher, tx) = fetcher_with_stream();

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        let done = syncer.sync().await.unwrap();
        assert_eq!(syncer.total_tracks(), 2);

        drop(tx);
        wait(done).await;
    }

    #[tokio::test]
    async fn test_synced_tracks_counts_up_and_resets() {
        let selected = tracks(&["track A", "track B"]);
        let mut store = store_returning(selected.clone());
        store.expect_save().times(2).returning(|_| Ok(()));
        let (fetcher, tx) = fetcher_with_stream();

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        let done = syncer.sync().await.unwrap();
        assert_eq!(syncer.synced_tracks(), 0);

        tx.send(ok(selected[0].clone())).await.unwrap();
        wait_for(&syncer, 1).await;
        assert_eq!(syncer.synced_tracks(), 1);

        tx.send(ok(selected[1].clone())).await.unwrap();
        drop(tx);
        wait(done).await;

        assert_eq!(syncer.synced_tracks(), -1);
        assert!(syncer.logs().is_empty());
        assert_eq!(syncer.total_tracks(), 0);
    }

    #[tokio::test]
    async fn test_failed_import_increments_error_counter() {
        let selected = vec![Track::new("1", "Artist", "track A").with_error_count(2)];
        let mut store = store_returning(selected.clone());
        store
            .expect_save()
            .withf(|track: &Track| track.lyrics_import_error_count == 3 && !track.loaded)
            .times(1)
            .returning(|_| Ok(()));
        let (fetcher, tx) = fetcher_with_stream();

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        let done = syncer.sync().await.unwrap();

        tx.send(failed(selected[0].clone())).await.unwrap();
        wait_for(&syncer, 1).await;
        tokio::time::timeout(Duration::from_secs(1), async {
            while syncer.tracks_failed() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(syncer.tracks_failed(), 1);
        assert_eq!(syncer.tracks_success(), 0);
        assert_eq!(
            syncer.logs(),
            "\u{274C} Artist - track A: Lyrics not found for track: track A by Artist"
        );

        drop(tx);
        let summary = wait(done).await;
        assert_eq!(summary.failure, 1);
    }

    #[tokio::test]
    async fn test_successful_import_resets_error_counter() {
        let selected = vec![Track::new("1", "Artist", "track A").with_error_count(2)];
        let mut store = store_returning(selected.clone());
        store
            .expect_save()
            .withf(|track: &Track| track.lyrics_import_error_count == 0 && track.loaded)
            .times(1)
            .returning(|_| Ok(()));
        let (fetcher, tx) = fetcher_with_stream();

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        let done = syncer.sync().await.unwrap();

        tx.send(ok(selected[0].clone())).await.unwrap();
        drop(tx);

        let summary = wait(done).await;
        assert_eq!(summary.success, 1);
    }

    #[tokio::test]
    async fn test_save_error_is_logged_as_failure() {
        let selected = tracks(&["track A", "track B"]);
        let mut store = store_returning(selected.clone());
        store
            .expect_save()
            .withf(|track: &Track| track.name == "track A")
            .returning(|_| Err(CoreError::TrackNotFound { id: "0".into() }));
        store
            .expect_save()
            .withf(|track: &Track| track.name == "track B")
            .returning(|_| Ok(()));
        let (fetcher, tx) = fetcher_with_stream();

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        let done = syncer.sync().await.unwrap();

        tx.send(ok(selected[0].clone())).await.unwrap();
        tx.send(ok(selected[1].clone())).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while syncer.progress().log.len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(
            syncer.logs(),
            "\u{2705} Artist - track B\n\u{274C} Artist - track A: Track not found: 0"
        );
        assert_eq!(syncer.tracks_success(), 1);
        assert_eq!(syncer.tracks_failed(), 1);

        drop(tx);
        let summary = wait(done).await;
        assert_eq!(
            summary,
            SyncSummary {
                total: 2,
                success: 1,
                failure: 1
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_all_error_drains_run() {
        let store = store_returning(tracks(&["track A"]));
        let mut fetcher = MockLyricsFetcher::new();
        fetcher
            .expect_fetch_all()
            .times(1)
            .returning(|_| Err(CoreError::RuntimeUnavailable));

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        let summary = wait(syncer.sync().await.unwrap()).await;

        assert_eq!(summary.success, 0);
        assert!(!syncer.syncing());
    }

    #[tokio::test]
    async fn test_completion_without_observer_does_not_block() {
        let store = store_returning(Vec::new());
        let mut fetcher = MockLyricsFetcher::new();
        fetcher.expect_fetch_all().times(2).returning(|_| {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        });

        let syncer = Syncer::new(Arc::new(fetcher), Arc::new(store));
        drop(syncer.sync().await.unwrap());

        tokio::time::timeout(Duration::from_secs(1), async {
            while syncer.syncing() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(syncer.sync().await.is_ok());
    }
}
