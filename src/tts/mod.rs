//! TTS (Text-to-Speech) Module
//!
//! Speech synthesis returns encoded audio; playback is the presenter's job.

use crate::config::Config;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub mod openai;

pub use openai::OpenAiSpeech;

/// Trait for speech synthesis backends
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + std::fmt::Debug {
    /// Synthesize the given text into audio bytes
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// File extension of the returned audio
    fn extension(&self) -> &str {
        "mp3"
    }

    /// Get the engine name
    fn name(&self) -> &str;
}

/// Factory to create the configured speech engine
pub fn create_engine(config: &Config) -> Result<Arc<dyn SpeechSynthesizer>> {
    info!(
        "🛠️ Creating speech engine: {} (voice: {})",
        config.tts_model, config.tts_voice
    );
    let engine: Arc<dyn SpeechSynthesizer> = Arc::new(OpenAiSpeech::new(config)?);
    info!("✅ Speech engine '{}' initialized", engine.name());
    Ok(engine)
}
