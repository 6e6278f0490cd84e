//! Scripted adapter for testing
//!
//! Replays a fixed list of events, then either ends or goes silent.

use async_trait::async_trait;
use gptbuddy::adapter::{AdapterEvent, RecognizedUtterance, WakeAdapter};
use gptbuddy::error::BuddyResult;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct ScriptedAdapter {
    events: VecDeque<AdapterEvent>,
    /// Never return once the script is exhausted
    hang_at_end: bool,
    pub captures_started: usize,
    pub captures_stopped: usize,
}

impl ScriptedAdapter {
    pub fn new(events: Vec<AdapterEvent>) -> Self {
        Self {
            events: events.into(),
            hang_at_end: false,
            captures_started: 0,
            captures_stopped: 0,
        }
    }

    /// Wake followed by one phrase
    pub fn with_phrase(text: &str) -> Self {
        Self::new(vec![
            AdapterEvent::WakeDetected,
            AdapterEvent::PhraseRecognized(RecognizedUtterance::new(text)),
        ])
    }

    pub fn hanging(mut self) -> Self {
        self.hang_at_end = true;
        self
    }
}

#[async_trait]
impl WakeAdapter for ScriptedAdapter {
    async fn next_event(&mut self) -> BuddyResult<Option<AdapterEvent>> {
        match self.events.pop_front() {
            Some(event) => Ok(Some(event)),
            None if self.hang_at_end => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn start_capture(&mut self) -> BuddyResult<()> {
        self.captures_started += 1;
        Ok(())
    }

    async fn stop_capture(&mut self) -> BuddyResult<()> {
        self.captures_stopped += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
