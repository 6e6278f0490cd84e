//! speechd-ng adapter
//!
//! Uses zbus for async D-Bus communication with the speechd-ng daemon.
//! Wake word spotting is done on the transcript of each VAD segment.

use super::{after_wake_word, AdapterEvent, RecognizedUtterance, WakeAdapter};
use crate::error::{BuddyError, BuddyResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::{debug, info, warn};
use zbus::{proxy, Connection};

/// D-Bus proxy for the speechd-ng service
#[proxy(
    interface = "org.speech.Service",
    default_service = "org.speech.Service",
    default_path = "/org/speech/Service"
)]
trait SpeechService {
    /// Listen with VAD and return transcript
    fn listen_vad(&self) -> zbus::Result<String>;

    /// Ping the service
    fn ping(&self) -> zbus::Result<String>;

    /// Get STT backend name
    fn get_stt_backend(&self) -> zbus::Result<String>;
}

#[derive(Debug)]
pub struct SpeechdAdapter {
    proxy: SpeechServiceProxy<'static>,
    wake_word: String,
    capturing: bool,
    pending: VecDeque<AdapterEvent>,
}

impl SpeechdAdapter {
    /// Connect to the speechd-ng D-Bus service
    pub async fn connect(wake_word: &str) -> BuddyResult<Self> {
        let connection = Connection::session()
            .await
            .map_err(|e| BuddyError::Adapter(format!("D-Bus session bus: {}", e)))?;
        let proxy = SpeechServiceProxy::new(&connection)
            .await
            .map_err(|e| BuddyError::Adapter(format!("speechd-ng proxy: {}", e)))?;

        match proxy.ping().await {
            Ok(response) => info!("🎙️ Connected to speechd-ng: {}", response),
            Err(e) => {
                return Err(BuddyError::Adapter(format!(
                    "speechd-ng not responding: {}",
                    e
                )))
            }
        }
        if let Ok(backend) = proxy.get_stt_backend().await {
            info!("   STT backend: {}", backend);
        }

        Ok(Self {
            proxy,
            wake_word: wake_word.to_string(),
            capturing: false,
            pending: VecDeque::new(),
        })
    }

    async fn listen(&self) -> BuddyResult<String> {
        debug!("Listening via speechd-ng...");
        self.proxy
            .listen_vad()
            .await
            .map_err(|e| BuddyError::Adapter(format!("listen_vad: {}", e)))
    }
}

#[async_trait]
impl WakeAdapter for SpeechdAdapter {
    async fn next_event(&mut self) -> BuddyResult<Option<AdapterEvent>> {
        if self.capturing {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            return Ok(Some(match self.listen().await {
                Ok(text) if !text.trim().is_empty() => {
                    AdapterEvent::PhraseRecognized(RecognizedUtterance::new(text.trim()))
                }
                Ok(_) => AdapterEvent::RecognitionFailed,
                Err(e) => {
                    warn!("⚠️ Recognition failed: {}", e);
                    AdapterEvent::RecognitionFailed
                }
            }));
        }

        loop {
            let transcript = self.listen().await?;
            if let Some(rest) = after_wake_word(&transcript, &self.wake_word) {
                if !rest.trim().is_empty() {
                    self.pending
                        .push_back(AdapterEvent::PhraseRecognized(RecognizedUtterance::new(
                            rest.trim(),
                        )));
                }
                return Ok(Some(AdapterEvent::WakeDetected));
            }
        }
    }

    async fn start_capture(&mut self) -> BuddyResult<()> {
        self.capturing = true;
        Ok(())
    }

    async fn stop_capture(&mut self) -> BuddyResult<()> {
        self.capturing = false;
        self.pending.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "speechd-ng"
    }
}
