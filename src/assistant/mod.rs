//! Conversational backend
//!
//! The controller only needs `{session, text} -> reply`. Thread handling and
//! polling stay inside the implementation.

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;

pub use openai::OpenAiAssistant;

/// One user turn sent to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct ConverseRequest {
    pub session_id: String,
    /// Backend thread to continue; `None` opens a new one
    pub thread_id: Option<String>,
    pub text: String,
}

/// Backend answer for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct ConverseReply {
    pub reply_text: String,
    /// Thread the reply belongs to, to be remembered in the session
    pub thread_id: String,
}

/// Trait for conversational backends
#[async_trait]
pub trait ConversationBackend: Send + Sync + std::fmt::Debug {
    /// Send one turn and wait for the reply (the caller bounds the wait)
    async fn converse(&self, request: &ConverseRequest) -> Result<ConverseReply>;

    /// Health check - verify the backend is reachable
    async fn health_check(&self) -> bool {
        true
    }

    /// Get the backend name
    fn name(&self) -> &str;
}
