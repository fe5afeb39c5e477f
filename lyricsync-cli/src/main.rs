use clap::{Parser, Subcommand};
use lyricsync_core::config::LyricsProviderType;
use lyricsync_core::{
    import_track, AsyncFetcher, CoreError, FallbackDetector, LyricsProvider, LyricsyncConfig,
    ProviderChain, SqliteTrackStore, SyncProgress, Syncer, Track,
};
use lyricsync_lyrics_lrclib::LrclibProvider;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "lyricsync", version, about = "Bulk lyrics import for a music library")]
struct Cli {
    /// Use this config file instead of ~/.config/lyricsync/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch lyrics for every track that still needs them
    Sync,
    /// Import lyrics for one track, even if bulk syncs gave up on it
    Retry {
        /// Catalog ID of the track
        spotify_id: String,
    },
    /// Show library and lyrics counts
    Status,
    /// Add tracks from a JSON array export to the library
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(LyricsyncConfig::config_path);

    init_tracing(check_file_logging_enabled(&config_path));

    let config = match LyricsyncConfig::load_or_create_at(&config_path) {
        Ok(config) => config,
        Err(CoreError::ConfigParseError(parse_error)) => {
            error!(
                "Config file {} has a syntax error: {}",
                config_path.display(),
                parse_error
            );
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CoreError::Busy) => {
            error!("A lyrics sync is already running, try again later");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: LyricsyncConfig) -> Result<(), CoreError> {
    let db_path = config.database.resolved_path();
    let store = Arc::new(
        SqliteTrackStore::open(&db_path, config.sync.max_lyrics_import_errors).await?,
    );

    match command {
        Command::Sync => {
            let syncer = Syncer::new(create_fetcher(&config), store);
            run_sync(&syncer, Duration::from_millis(config.sync.poll_interval_ms)).await
        }
        Command::Retry { spotify_id } => {
            let fetcher = create_fetcher(&config);
            let track = import_track(fetcher.as_ref(), store.as_ref(), &spotify_id).await?;
            println!(
                "{} - {} ({})",
                track.artist, track.name, track.language
            );
            println!("{}", track.lyrics);
            Ok(())
        }
        Command::Status => {
            let total = store.count().await?;
            let with_lyrics = store.count_with_lyrics().await?;
            let exhausted = store.tracks_with_lyrics_error().await?;

            println!("Library: {total} tracks");
            println!("With lyrics: {with_lyrics}");
            println!(
                "Skipped after {} failed imports: {}",
                config.sync.max_lyrics_import_errors,
                exhausted.len()
            );
            for track in exhausted {
                println!("  {}  {} - {}", track.spotify_id, track.artist, track.name);
            }
            Ok(())
        }
        Command::Import { file } => {
            let content = std::fs::read_to_string(&file)?;
            let tracks: Vec<Track> = serde_json::from_str(&content)?;
            let imported = store.upsert_metadata(tracks).await?;
            println!("Imported {imported} tracks from {}", file.display());
            Ok(())
        }
    }
}

/// Start a sync and print its log until it completes
async fn run_sync(syncer: &Syncer, poll_interval: Duration) -> Result<(), CoreError> {
    let mut done = syncer.sync().await?;
    let mut printed = 0;
    let mut ticker = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            summary = &mut done => {
                let Ok(summary) = summary else {
                    error!("Lyrics sync ended without reporting a result");
                    return Ok(());
                };
                println!(
                    "Done: {} of {} tracks imported, {} failed",
                    summary.success, summary.total, summary.failure
                );
                return Ok(());
            }
            _ = ticker.tick() => {
                printed = print_new_entries(&syncer.progress(), printed);
            }
        }
    }
}

/// Print log entries past `printed`, returning the new count
fn print_new_entries(progress: &SyncProgress, printed: usize) -> usize {
    if !progress.is_running() {
        return printed;
    }
    for entry in progress.log.iter().skip(printed) {
        println!(
            "[{}/{}] {}",
            progress.completed,
            progress.total,
            entry.render()
        );
    }
    progress.log.len()
}

fn create_fetcher(config: &LyricsyncConfig) -> Arc<AsyncFetcher> {
    let chain = ProviderChain::new(create_providers(config));
    info!(
        "Initialized {} lyrics provider(s): {:?}",
        chain.len(),
        chain.names()
    );

    Arc::new(AsyncFetcher::new(
        Arc::new(chain),
        Arc::new(FallbackDetector),
        config.sync.concurrency,
    ))
}

fn create_providers(config: &LyricsyncConfig) -> Vec<Box<dyn LyricsProvider>> {
    config
        .lyrics
        .providers
        .iter()
        .filter_map(|provider_type| -> Option<Box<dyn LyricsProvider>> {
            match provider_type {
                LyricsProviderType::Lrclib => {
                    info!("Initializing LRCLIB provider");
                    match LrclibProvider::with_config(&config.providers.lrclib) {
                        Ok(provider) => Some(Box::new(provider)),
                        Err(e) => {
                            error!("Failed to create LRCLIB provider: {}", e);
                            None
                        }
                    }
                }
            }
        })
        .collect()
}

/// Peek at `logging.enabled` before the full config is loaded
fn check_file_logging_enabled(config_path: &Path) -> bool {
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        enabled: bool,
    }

    let Ok(content) = std::fs::read_to_string(config_path) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.enabled)
        .unwrap_or(false)
}

/// Initialize tracing with console output and optional file logging
fn init_tracing(file_logging_enabled: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if file_logging_enabled {
        let log_path = lyricsync_core::paths::log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyricsync_core::SyncLogEntry;

    #[test]
    fn test_cli_parses_retry() {
        let cli = Cli::try_parse_from(["lyricsync", "retry", "4uLU6hMCjMI75M1A2tKUQC"]).unwrap();
        assert!(matches!(cli.command, Command::Retry { ref spotify_id } if spotify_id == "4uLU6hMCjMI75M1A2tKUQC"));
    }

    #[test]
    fn test_cli_global_config_flag() {
        let cli = Cli::try_parse_from(["lyricsync", "status", "--config", "/tmp/c.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn test_print_new_entries_advances() {
        let mut progress = SyncProgress::default();
        progress.start(3);
        progress.track_completed();
        progress.record(SyncLogEntry::success("A", "One"));

        let printed = print_new_entries(&progress, 0);
        assert_eq!(printed, 1);

        progress.track_completed();
        progress.record(SyncLogEntry::failure("B", "Two", "no lyrics"));
        assert_eq!(print_new_entries(&progress, printed), 2);
    }

    #[test]
    fn test_print_new_entries_ignores_idle_state() {
        assert_eq!(print_new_entries(&SyncProgress::default(), 4), 4);
    }

    #[test]
    fn test_missing_config_disables_file_logging() {
        assert!(!check_file_logging_enabled(Path::new("/nonexistent/lyricsync.toml")));
    }
}
