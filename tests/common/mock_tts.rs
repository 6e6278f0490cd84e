//! Mock speech synthesis for testing
//!
//! Records all synthesized text for verification.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Mock engine that records synthesized text
#[derive(Debug)]
pub struct MockSpeech {
    /// All text that was synthesized
    pub spoken: Arc<Mutex<Vec<String>>>,
    /// Simulate failure on next call
    pub should_fail: Arc<Mutex<bool>>,
}

impl MockSpeech {
    pub fn new() -> Self {
        Self {
            spoken: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    /// Get all synthesized phrases
    pub fn get_spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    /// Check if a phrase was synthesized
    pub fn was_spoken(&self, text: &str) -> bool {
        self.spoken.lock().unwrap().iter().any(|s| s.contains(text))
    }
}

impl Default for MockSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl gptbuddy::tts::SpeechSynthesizer for MockSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if *self.should_fail.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock speech failure"));
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(b"ID3 mock audio".to_vec())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
