//! Conversational session
//!
//! One session survives process restarts. It is persisted as a small JSON
//! file so the scheduled follow-up caller can continue the same thread.

use crate::error::BuddyResult;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A persisted conversational thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    /// Backend thread reference, opened on the first conversation
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub last_prompt: Option<String>,
    #[serde(default)]
    pub last_generated_image_path: Option<PathBuf>,
    /// Task id that produced `last_generated_image_path` in this process.
    /// Task ids restart with every process, so this is never persisted.
    #[serde(skip)]
    pub last_image_seq: u64,
    pub created_at: DateTime<Local>,
}

impl Session {
    /// Start a fresh session with a random id
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            thread_id: None,
            last_prompt: None,
            last_generated_image_path: None,
            last_image_seq: 0,
            created_at: Local::now(),
        }
    }

    /// Record a finished image unless a newer one is already recorded.
    /// Returns whether the pointer moved.
    pub fn record_image(&mut self, path: PathBuf, seq: u64) -> bool {
        if seq < self.last_image_seq {
            debug!(
                "Ignoring stale image from task {} (current {})",
                seq, self.last_image_seq
            );
            return false;
        }
        self.last_generated_image_path = Some(path);
        self.last_image_seq = seq;
        true
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// File-backed storage for the session
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted session. A missing file means "no session yet";
    /// a corrupt one is moved aside and treated the same way.
    pub fn load(&self) -> BuddyResult<Option<Session>> {
        if !self.path.exists() {
            debug!("No session file at {:?}", self.path);
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Session>(&content) {
            Ok(session) if !session.session_id.trim().is_empty() => {
                info!("📂 Resumed session {}", session.session_id);
                Ok(Some(session))
            }
            Ok(_) => {
                warn!("⚠️ Session file has an empty id, starting fresh");
                Ok(None)
            }
            Err(e) => {
                warn!("⚠️ Session file corrupted, starting fresh: {}", e);
                let backup_path = self.path.with_extension("json.corrupt");
                let _ = std::fs::rename(&self.path, &backup_path);
                Ok(None)
            }
        }
    }

    /// Write the session atomically (temp file + rename)
    pub fn save(&self, session: &Session) -> BuddyResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(session)?;
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("💾 Session saved to {:?}", self.path);
        Ok(())
    }
}
