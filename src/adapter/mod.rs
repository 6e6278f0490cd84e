//! Wake word and speech recognition adapters
//!
//! The controller never sees audio. An adapter turns whatever it listens to
//! into discrete [`AdapterEvent`]s.

pub mod console;
pub mod speechd;

use crate::config::Config;
use crate::error::{BuddyError, BuddyResult};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::info;

pub use console::ConsoleAdapter;
pub use speechd::SpeechdAdapter;

/// Immutable recognized text
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedUtterance {
    pub text: String,
    pub timestamp: DateTime<Local>,
}

impl RecognizedUtterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Local::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    WakeDetected,
    PhraseRecognized(RecognizedUtterance),
    RecognitionFailed,
}

/// Trait for event sources
#[async_trait]
pub trait WakeAdapter: Send + std::fmt::Debug {
    /// Next event; `None` when the source is exhausted. Errors are fatal.
    async fn next_event(&mut self) -> BuddyResult<Option<AdapterEvent>>;

    /// Switch from wake word spotting to phrase capture
    async fn start_capture(&mut self) -> BuddyResult<()> {
        Ok(())
    }

    /// Back to wake word spotting
    async fn stop_capture(&mut self) -> BuddyResult<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Split a transcript at the wake word. Returns the text after it (possibly
/// empty) when the wake word is present.
pub fn after_wake_word<'a>(transcript: &'a str, wake_word: &str) -> Option<&'a str> {
    let wake = wake_word.trim().to_lowercase();
    if wake.is_empty() {
        return None;
    }
    let lower = transcript.to_lowercase();
    let start = lower.find(&wake)?;
    let end = start + wake.len();
    // Lowercasing can shift byte offsets for non-ASCII text
    if lower.len() != transcript.len() || !transcript.is_char_boundary(end) {
        return Some("");
    }
    Some(transcript[end..].trim_start_matches(|c: char| c.is_whitespace() || c == ','))
}

/// Factory for the adapter named in config (or on the command line)
pub async fn create_adapter(config: &Config) -> BuddyResult<Box<dyn WakeAdapter>> {
    info!("🎙️ Creating adapter: {}", config.adapter);
    match config.adapter.as_str() {
        "console" => Ok(Box::new(ConsoleAdapter::stdin(&config.wake_word))),
        "speechd" => Ok(Box::new(SpeechdAdapter::connect(&config.wake_word).await?)),
        other => Err(BuddyError::Adapter(format!("unknown adapter '{}'", other))),
    }
}
