use crate::error::CoreError;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Trait for lyrics providers
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Search plain-text lyrics for a song
    async fn search(&self, artist: &str, title: &str) -> Result<String, CoreError>;
}

/// Trait for classifying the language of lyrics
pub trait LanguageDetector: Send + Sync {
    /// Detect the language of `text`, returning a lowercase language name
    ///
    /// # Errors
    ///
    /// Returns an error if the language cannot be determined.
    fn detect(&self, text: &str) -> Result<String, CoreError>;
}

/// Detector that never recognizes a language, so callers fall back to the default
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackDetector;

impl LanguageDetector for FallbackDetector {
    fn detect(&self, _text: &str) -> Result<String, CoreError> {
        Err(CoreError::UnknownLanguage)
    }
}

/// Tries a list of providers in order; the first non-empty result wins
pub struct ProviderChain {
    providers: Vec<Box<dyn LyricsProvider>>,
}

impl ProviderChain {
    #[must_use]
    pub fn new(providers: Vec<Box<dyn LyricsProvider>>) -> Self {
        Self { providers }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Names of the providers in lookup order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

#[async_trait]
impl LyricsProvider for ProviderChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn search(&self, artist: &str, title: &str) -> Result<String, CoreError> {
        let mut last_error = None;

        for provider in &self.providers {
            debug!("Trying provider {} for {} - {}", provider.name(), artist, title);
            match provider.search(artist, title).await {
                Ok(lyrics) if !lyrics.trim().is_empty() => {
                    info!("Found lyrics for {} - {} via {}", artist, title, provider.name());
                    return Ok(lyrics);
                }
                Ok(_) => {
                    debug!("Provider {} returned empty lyrics", provider.name());
                    last_error = Some(CoreError::LyricsNotFound {
                        track: title.to_string(),
                        artist: artist.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Provider {} failed with error: {}", provider.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::LyricsNotFound {
            track: title.to_string(),
            artist: artist.to_string(),
        }))
    }
}
