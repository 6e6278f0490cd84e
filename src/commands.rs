//! Command classification
//!
//! Maps a recognized utterance to one of a closed set of intents using an
//! ordered table of trigger phrases. First match wins.

use crate::imaging::ProviderKind;
use thiserror::Error;
use tracing::debug;

/// Longest utterance passed on to handlers
pub const MAX_UTTERANCE_CHARS: usize = 500;

/// Phrases that end the exchange before any backend request
const CANCEL_PHRASES: &[&str] = &[
    "nevermind",
    "never mind",
    "thanks",
    "stop",
    "cancel that",
    "cancel",
    "nothing",
    "forget it",
];

/// Phrases that send the last generated image
const SEND_PHRASES: &[&str] = &["send", "telegram"];

/// Phrases that show a random saved image
const RANDOM_PHRASES: &[&str] = &["random"];

/// Phrases that regenerate from the previous prompt
const MAKE_ANOTHER_PHRASES: &[&str] = &["make another", "make more"];

/// Image triggers, longest first so "about" is stripped from the prompt
const IMAGE_PHRASES: &[(&str, ProviderKind)] = &[
    ("make image about", ProviderKind::Local),
    ("make image", ProviderKind::Local),
    ("make picture about", ProviderKind::Hosted),
    ("make picture", ProviderKind::Hosted),
];

/// The classified meaning of an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Cancel,
    SendLast,
    ShowRandom,
    MakeAnother,
    GenerateImage {
        prompt: String,
        provider: ProviderKind,
    },
    Converse {
        text: String,
    },
}

impl Intent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Cancel => "cancel",
            Intent::SendLast => "send_last",
            Intent::ShowRandom => "show_random",
            Intent::MakeAnother => "make_another",
            Intent::GenerateImage { .. } => "generate_image",
            Intent::Converse { .. } => "converse",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("trigger '{trigger}' has no prompt after it")]
    EmptyPrompt { trigger: &'static str },
}

/// A word of the utterance with its byte range in the input text
struct Word {
    text: String,
    end: usize,
}

fn words(text: &str) -> Vec<Word> {
    let mut out = Vec::new();
    let mut start = None;

    for (idx, ch) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        match (start, ch.is_whitespace()) {
            (None, false) => start = Some(idx),
            (Some(s), true) => {
                let raw = &text[s..idx];
                let word = raw
                    .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                    .to_lowercase();
                if !word.is_empty() {
                    out.push(Word {
                        text: word,
                        end: idx,
                    });
                }
                start = None;
            }
            _ => {}
        }
    }

    out
}

/// Position just past the first occurrence of `phrase` as whole words
fn find_phrase(words: &[Word], phrase: &str) -> Option<usize> {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return None;
    }

    words
        .windows(needle.len())
        .find(|window| window.iter().zip(&needle).all(|(w, n)| w.text == *n))
        .map(|window| window[window.len() - 1].end)
}

fn matches_any(words: &[Word], phrases: &'static [&'static str]) -> Option<&'static str> {
    phrases
        .iter()
        .copied()
        .find(|p| find_phrase(words, p).is_some())
}

/// Classify an utterance. Priority: cancel, send, random, make another, image, converse.
pub fn classify(text: &str) -> Result<Intent, ClassifyError> {
    let words = words(text);

    if let Some(trigger) = matches_any(&words, CANCEL_PHRASES) {
        debug!("🎯 Matched cancel (trigger: '{}')", trigger);
        return Ok(Intent::Cancel);
    }
    if let Some(trigger) = matches_any(&words, SEND_PHRASES) {
        debug!("🎯 Matched send (trigger: '{}')", trigger);
        return Ok(Intent::SendLast);
    }
    if let Some(trigger) = matches_any(&words, RANDOM_PHRASES) {
        debug!("🎯 Matched random (trigger: '{}')", trigger);
        return Ok(Intent::ShowRandom);
    }
    if let Some(trigger) = matches_any(&words, MAKE_ANOTHER_PHRASES) {
        debug!("🎯 Matched make another (trigger: '{}')", trigger);
        return Ok(Intent::MakeAnother);
    }

    for &(trigger, provider) in IMAGE_PHRASES {
        if let Some(end) = find_phrase(&words, trigger) {
            let prompt = text[end..].trim();
            if prompt.is_empty() {
                return Err(ClassifyError::EmptyPrompt { trigger });
            }
            debug!("🎯 Matched image (trigger: '{}', provider: {:?})", trigger, provider);
            return Ok(Intent::GenerateImage {
                prompt: prompt.to_string(),
                provider,
            });
        }
    }

    Ok(Intent::Converse {
        text: text.to_string(),
    })
}

/// Trim, cap length and strip control characters from recognized speech
pub fn sanitize(text: &str) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count > MAX_UTTERANCE_CHARS {
        tracing::warn!(
            "⚠️ Input truncated from {} to {} characters",
            count,
            MAX_UTTERANCE_CHARS
        );
    }

    trimmed
        .chars()
        .take(MAX_UTTERANCE_CHARS)
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}
