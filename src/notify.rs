//! Outbound notifications
//!
//! Sends the last generated image to the configured apprise services.

use crate::config::Config;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Trait for notification channels
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Deliver `body` with `attachment`
    async fn send(&self, title: &str, body: &str, attachment: &Path) -> Result<()>;

    fn name(&self) -> &str;
}

/// Shells out to the `apprise` CLI
#[derive(Debug, Clone)]
pub struct AppriseNotifier {
    program: String,
    services: Vec<String>,
}

impl AppriseNotifier {
    pub fn new(config: &Config) -> Self {
        Self {
            program: "apprise".to_string(),
            services: config.apprise_services.clone(),
        }
    }

    pub fn args(&self, title: &str, body: &str, attachment: &Path) -> Vec<String> {
        let mut args = vec![
            "-t".to_string(),
            title.to_string(),
            "-b".to_string(),
            body.to_string(),
            "--attach".to_string(),
            attachment.to_string_lossy().to_string(),
        ];
        args.extend(self.services.iter().cloned());
        args
    }
}

#[async_trait]
impl Notifier for AppriseNotifier {
    async fn send(&self, title: &str, body: &str, attachment: &Path) -> Result<()> {
        if self.services.is_empty() {
            info!("📭 No notification services configured, skipping");
            return Ok(());
        }

        debug!("Sending {:?} to {} service(s)", attachment, self.services.len());
        let output = Command::new(&self.program)
            .args(self.args(title, body, attachment))
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            bail!(
                "apprise exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        info!("📨 Notification sent");
        Ok(())
    }

    fn name(&self) -> &str {
        "apprise"
    }
}
