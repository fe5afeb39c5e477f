use async_trait::async_trait;
use lyricsync_core::{CoreError, LrclibConfig, LyricsProvider};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const LRCLIB_API_URL: &str = "https://lrclib.net/api";

/// LRCLIB.net lyrics provider
pub struct LrclibProvider {
    client: ClientWithMiddleware,
    base_url: String,
}

impl LrclibProvider {
    /// Create a new LRCLIB provider with default 10-second timeout and 3 retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, CoreError> {
        Self::with_config(&LrclibConfig::default())
    }

    /// Create a provider using timeouts and retries from the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_config(config: &LrclibConfig) -> Result<Self, CoreError> {
        // Base client with timeout
        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("Lyricsync/0.1 (https://github.com/lyricsync/lyricsync)")
            .build()?;

        // Wrap with retry middleware (exponential backoff)
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: LRCLIB_API_URL.to_string(),
        })
    }

    /// Point the provider at another LRCLIB-compatible server
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Response from LRCLIB API
/// Note: API returns additional fields (albumName, duration) that we don't use;
/// serde ignores unknown fields by default.
#[derive(Debug, Deserialize)]
struct LrclibResponse {
    id: i64,
    #[serde(rename = "artistName")]
    artist_name: String,
    #[serde(default)]
    instrumental: bool,
    #[serde(rename = "plainLyrics")]
    plain_lyrics: Option<String>,
    #[serde(rename = "syncedLyrics")]
    synced_lyrics: Option<String>,
}

#[async_trait]
impl LyricsProvider for LrclibProvider {
    fn name(&self) -> &'static str {
        "lrclib"
    }

    async fn search(&self, artist: &str, title: &str) -> Result<String, CoreError> {
        let url = format!(
            "{}/get?artist_name={}&track_name={}",
            self.base_url,
            urlencoding::encode(artist),
            urlencoding::encode(title)
        );

        debug!("LRCLIB GET (exact match): {}", url);

        let response = self.client.get(&url).send().await?;
        debug!("LRCLIB response status: {}", response.status());

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("LRCLIB exact match not found for {} - {}, searching", artist, title);
            return self.search_fallback(artist, title).await;
        }

        if !response.status().is_success() {
            warn!("LRCLIB returned status: {}", response.status());
            return Err(CoreError::LyricsProviderFailed {
                provider: self.name().to_string(),
                reason: format!("LRCLIB returned status: {}", response.status()),
            });
        }

        let result: LrclibResponse = response.json().await?;
        info!("LRCLIB found match with id: {}", result.id);
        lyrics_text(result).ok_or_else(|| not_found(artist, title))
    }
}

impl LrclibProvider {
    async fn search_fallback(&self, artist: &str, title: &str) -> Result<String, CoreError> {
        let search_query = format!("{artist} {title}");
        let url = format!(
            "{}/search?q={}",
            self.base_url,
            urlencoding::encode(&search_query)
        );

        debug!("LRCLIB GET (full search): {}", url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(CoreError::LyricsProviderFailed {
                provider: self.name().to_string(),
                reason: format!("LRCLIB search returned status: {}", response.status()),
            });
        }

        let results: Vec<LrclibResponse> =
            response.json().await?;

        best_match(results).ok_or_else(|| not_found(artist, title))
    }
}

fn not_found(artist: &str, title: &str) -> CoreError {
    CoreError::LyricsNotFound {
        track: title.to_string(),
        artist: artist.to_string(),
    }
}

/// Lyrics of the first search result that has any, in API ranking order
fn best_match(results: Vec<LrclibResponse>) -> Option<String> {
    for result in results {
        let (id, artist) = (result.id, result.artist_name.clone());
        if let Some(lyrics) = lyrics_text(result) {
            info!("LRCLIB found match via search (id: {}, artist: {})", id, artist);
            return Some(lyrics);
        }
    }
    None
}

/// Plain lyrics of a response, falling back to synced lyrics without timestamps
fn lyrics_text(result: LrclibResponse) -> Option<String> {
    if result.instrumental {
        debug!("Track is instrumental (lrclib id: {})", result.id);
        return None;
    }

    if let Some(plain) = result.plain_lyrics.filter(|p| !p.trim().is_empty()) {
        return Some(plain);
    }

    result
        .synced_lyrics
        .map(|synced| strip_timestamps(&synced))
        .filter(|text| !text.trim().is_empty())
}

/// Remove `[mm:ss.xx]` line tags and `<mm:ss.xx>` word tags from LRC text
fn strip_timestamps(lrc: &str) -> String {
    lrc.lines()
        .filter_map(|line| {
            let mut rest = line.trim();
            let mut tagged = false;
            while let Some(stripped) = rest.strip_prefix('[') {
                let end = stripped.find(']')?;
                rest = stripped[end + 1..].trim_start();
                tagged = true;
            }
            if tagged && rest.is_empty() {
                return None;
            }
            Some(strip_word_tags(rest))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_word_tags(line: &str) -> String {
    let mut output = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(start) = rest.find('<') {
        output.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = rest[start + end + 1..].trim_start(),
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    output.push_str(rest);
    output.trim_end().to_string()
}
