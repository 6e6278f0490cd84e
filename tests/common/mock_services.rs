//! Mock collaborators for testing
//!
//! Each mock records what it was asked to do.

use anyhow::Result;
use async_trait::async_trait;
use gptbuddy::assistant::{ConversationBackend, ConverseReply, ConverseRequest};
use gptbuddy::error::{BuddyError, BuddyResult};
use gptbuddy::imaging::{ImageProvider, ImageRequest};
use gptbuddy::notify::Notifier;
use gptbuddy::presenter::Presenter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Backend that answers with a fixed reply
#[derive(Debug)]
pub struct MockBackend {
    pub reply: String,
    /// Sleep before answering
    pub delay: Option<Duration>,
    pub requests: Mutex<Vec<ConverseRequest>>,
}

impl MockBackend {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(reply: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(reply)
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ConversationBackend for MockBackend {
    async fn converse(&self, request: &ConverseRequest) -> Result<ConverseReply> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ConverseReply {
            reply_text: self.reply.clone(),
            thread_id: request
                .thread_id
                .clone()
                .unwrap_or_else(|| "thread_test".to_string()),
        })
    }

    fn name(&self) -> &str {
        "mock-backend"
    }
}

/// Provider that returns a tiny PNG, or stalls on matching prompts
#[derive(Debug)]
pub struct MockImageProvider {
    name: String,
    /// Prompts containing this never finish
    pub stall_on: Option<&'static str>,
    pub requests: Mutex<Vec<ImageRequest>>,
}

impl MockImageProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stall_on: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn stalling_on(name: &str, marker: &'static str) -> Self {
        Self {
            stall_on: Some(marker),
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ImageRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ImageProvider for MockImageProvider {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(marker) = self.stall_on {
            if request.prompt.contains(marker) {
                // Ignores cancellation like a hung HTTP call
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
        Ok(super::tiny_png())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresenterCall {
    Audio(PathBuf),
    Image(PathBuf),
    Cleared,
}

/// Presenter that records calls; missing files fail like the real one
#[derive(Debug, Default)]
pub struct MockPresenter {
    pub calls: Mutex<Vec<PresenterCall>>,
    /// How long each existing audio file takes to play
    pub audio_delay: Option<Duration>,
}

impl MockPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow_audio(delay: Duration) -> Self {
        Self {
            audio_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn get_calls(&self) -> Vec<PresenterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn displayed(&self) -> Vec<PathBuf> {
        self.get_calls()
            .into_iter()
            .filter_map(|c| match c {
                PresenterCall::Image(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Presenter for MockPresenter {
    async fn play_audio(&self, path: &Path) -> BuddyResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(PresenterCall::Audio(path.to_path_buf()));
        if !path.exists() {
            return Err(BuddyError::Presentation(format!("missing {:?}", path)));
        }
        if let Some(delay) = self.audio_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn display_image(&self, path: &Path) -> BuddyResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(PresenterCall::Image(path.to_path_buf()));
        if !path.exists() {
            return Err(BuddyError::Presentation(format!("missing {:?}", path)));
        }
        Ok(())
    }

    async fn clear(&self) -> BuddyResult<()> {
        self.calls.lock().unwrap().push(PresenterCall::Cleared);
        Ok(())
    }
}

/// Notifier that records attachments
#[derive(Debug, Default)]
pub struct MockNotifier {
    pub sent: Mutex<Vec<PathBuf>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_sent(&self) -> Vec<PathBuf> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, _title: &str, _body: &str, attachment: &Path) -> Result<()> {
        self.sent.lock().unwrap().push(attachment.to_path_buf());
        Ok(())
    }

    fn name(&self) -> &str {
        "mock-notifier"
    }
}
