//! Line-oriented adapter
//!
//! Each input line stands for one recognition result. While idle, a line
//! containing the wake word wakes the assistant; any text after the wake
//! word becomes the phrase. While capturing, a line is the phrase and a
//! blank line is a recognition failure.

use super::{after_wake_word, AdapterEvent, RecognizedUtterance, WakeAdapter};
use crate::error::{BuddyError, BuddyResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

pub struct ConsoleAdapter<R = BufReader<Stdin>> {
    lines: Lines<R>,
    wake_word: String,
    capturing: bool,
    pending: VecDeque<AdapterEvent>,
}

impl<R> std::fmt::Debug for ConsoleAdapter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleAdapter")
            .field("wake_word", &self.wake_word)
            .field("capturing", &self.capturing)
            .finish()
    }
}

impl ConsoleAdapter {
    pub fn stdin(wake_word: &str) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), wake_word)
    }
}

impl<R: AsyncBufRead + Unpin + Send> ConsoleAdapter<R> {
    pub fn new(reader: R, wake_word: &str) -> Self {
        Self {
            lines: reader.lines(),
            wake_word: wake_word.to_string(),
            capturing: false,
            pending: VecDeque::new(),
        }
    }

    fn interpret(&mut self, line: &str) -> Option<AdapterEvent> {
        if self.capturing {
            let text = line.trim();
            return Some(if text.is_empty() {
                AdapterEvent::RecognitionFailed
            } else {
                AdapterEvent::PhraseRecognized(RecognizedUtterance::new(text))
            });
        }

        let rest = after_wake_word(line, &self.wake_word)?;
        if !rest.trim().is_empty() {
            self.pending
                .push_back(AdapterEvent::PhraseRecognized(RecognizedUtterance::new(
                    rest.trim(),
                )));
        }
        Some(AdapterEvent::WakeDetected)
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> WakeAdapter for ConsoleAdapter<R> {
    async fn next_event(&mut self) -> BuddyResult<Option<AdapterEvent>> {
        if self.capturing {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
        }

        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| BuddyError::Adapter(format!("stdin: {}", e)))?;
            let Some(line) = line else {
                return Ok(None);
            };
            match self.interpret(&line) {
                Some(event) => return Ok(Some(event)),
                None => debug!("Ignoring input without wake word: '{}'", line),
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
        "console"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(input: &'static str) -> ConsoleAdapter<&'static [u8]> {
        ConsoleAdapter::new(input.as_bytes(), "porcupine")
    }

    #[tokio::test]
    async fn test_wake_then_phrase() {
        let mut adapter = adapter("porcupine\nmake image of a fox\n");
        assert_eq!(
            adapter.next_event().await.expect("event"),
            Some(AdapterEvent::WakeDetected)
        );
        adapter.start_capture().await.expect("capture");
        match adapter.next_event().await.expect("event") {
            Some(AdapterEvent::PhraseRecognized(u)) => assert_eq!(u.text, "make image of a fox"),
            other => panic!("unexpected {:?}", other),
        }
        adapter.stop_capture().await.expect("stop");
        assert_eq!(adapter.next_event().await.expect("event"), None);
    }

    #[tokio::test]
    async fn test_phrase_on_wake_line() {
        let mut adapter = adapter("hello\nporcupine random\n");
        assert_eq!(
            adapter.next_event().await.expect("event"),
            Some(AdapterEvent::WakeDetected)
        );
        adapter.start_capture().await.expect("capture");
        match adapter.next_event().await.expect("event") {
            Some(AdapterEvent::PhraseRecognized(u)) => assert_eq!(u.text, "random"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_line_while_capturing_is_failure() {
        let mut adapter = adapter("porcupine\n\n");
        adapter.next_event().await.expect("wake");
        adapter.start_capture().await.expect("capture");
        assert_eq!(
            adapter.next_event().await.expect("event"),
            Some(AdapterEvent::RecognitionFailed)
        );
    }
}
