//! OpenAI speech endpoint

use super::SpeechSynthesizer;
use crate::config::Config;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    timeout: Duration,
}

impl OpenAiSpeech {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
            model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
            timeout: config.network_timeout(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        debug!("Generating speech for text ({} chars)", text.len());

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "voice": self.voice,
                "input": text,
            }))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("❌ Speech API error ({}): {}", status, body);
            anyhow::bail!("Speech API returned {}", status);
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            anyhow::bail!("Speech API returned no audio");
        }
        Ok(audio.to_vec())
    }

    fn name(&self) -> &str {
        "openai-tts"
    }
}
