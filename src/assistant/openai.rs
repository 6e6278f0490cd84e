//! OpenAI Assistants integration
//!
//! Each turn appends a user message to the session's thread, starts a run and
//! polls until it completes, then reads the newest message.

use super::{ConversationBackend, ConverseReply, ConverseRequest};
use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interval between run status checks
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct Thread {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Run {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    role: String,
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
struct MessageText {
    value: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiAssistant {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    assistant_id: String,
    brief_prompt: String,
    timeout: Duration,
}

impl OpenAiAssistant {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
            assistant_id: config.openai_assistant_id.clone(),
            brief_prompt: config.brief_prompt.clone(),
            timeout: config.network_timeout(),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .timeout(self.timeout);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!("❌ Assistants API error ({}) on {}: {}", status, path, text);
            anyhow::bail!("Assistants API returned {} for {}", status, path);
        }

        serde_json::from_str(&text).with_context(|| format!("Malformed response from {}", path))
    }

    async fn create_thread(&self) -> Result<String> {
        let thread: Thread = self
            .request(reqwest::Method::POST, "/threads", Some(serde_json::json!({})))
            .await?;
        info!("🧵 Assistant thread created: {}", thread.id);
        Ok(thread.id)
    }

    async fn wait_for_run(&self, thread_id: &str, run: Run) -> Result<()> {
        let mut run = run;
        loop {
            match run.status.as_str() {
                "completed" => return Ok(()),
                "failed" | "cancelled" | "expired" | "incomplete" => {
                    anyhow::bail!("Assistant run {} ended with status '{}'", run.id, run.status)
                }
                other => debug!("Run {} status: {}", run.id, other),
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            run = self
                .request(
                    reqwest::Method::GET,
                    &format!("/threads/{}/runs/{}", thread_id, run.id),
                    None,
                )
                .await?;
        }
    }

    async fn latest_reply(&self, thread_id: &str) -> Result<String> {
        let messages: MessageList = self
            .request(
                reqwest::Method::GET,
                &format!("/threads/{}/messages?limit=1&order=desc", thread_id),
                None,
            )
            .await?;
        extract_reply(messages)
    }
}

/// Text of the newest assistant message
fn extract_reply(messages: MessageList) -> Result<String> {
    let message = messages
        .data
        .into_iter()
        .next()
        .context("Thread has no messages")?;
    if !message.role.is_empty() && message.role != "assistant" {
        anyhow::bail!("Newest message is from '{}', not the assistant", message.role);
    }

    message
        .content
        .into_iter()
        .find(|c| c.kind == "text")
        .and_then(|c| c.text)
        .map(|t| t.value)
        .context("Assistant message has no text")
}

#[async_trait]
impl ConversationBackend for OpenAiAssistant {
    async fn converse(&self, request: &ConverseRequest) -> Result<ConverseReply> {
        let thread_id = match &request.thread_id {
            Some(id) => id.clone(),
            None => self.create_thread().await?,
        };
        info!(
            "💬 Sending message to assistant (session {}, thread {})",
            request.session_id, thread_id
        );

        let content = format!("{}\n{}", request.text, self.brief_prompt);
        let _: serde_json::Value = self
            .request(
                reqwest::Method::POST,
                &format!("/threads/{}/messages", thread_id),
                Some(serde_json::json!({ "role": "user", "content": content })),
            )
            .await?;

        let run: Run = self
            .request(
                reqwest::Method::POST,
                &format!("/threads/{}/runs", thread_id),
                Some(serde_json::json!({ "assistant_id": self.assistant_id })),
            )
            .await?;
        self.wait_for_run(&thread_id, run).await?;

        let reply_text = self.latest_reply(&thread_id).await?;
        info!("💬 Assistant response ({} chars)", reply_text.len());
        Ok(ConverseReply {
            reply_text,
            thread_id,
        })
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        "openai-assistant"
    }
}
