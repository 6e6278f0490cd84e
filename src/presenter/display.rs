//! Framebuffer image display
//!
//! At most one viewer process exists. Showing a new image kills the previous
//! viewer and waits for it before spawning the next one.

use crate::error::{BuddyError, BuddyResult};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How long to wait for a killed viewer to exit
const VIEWER_EXIT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct ImageDisplay {
    command: Vec<String>,
    current: Mutex<Option<Child>>,
}

impl ImageDisplay {
    pub fn new(command: Vec<String>) -> BuddyResult<Self> {
        if command.is_empty() {
            return Err(BuddyError::Config("display_command is empty".to_string()));
        }
        Ok(Self {
            command,
            current: Mutex::new(None),
        })
    }

    pub fn program(&self) -> &str {
        &self.command[0]
    }

    /// Arguments for showing `path`; appended when no `{path}` placeholder exists
    pub fn args_for(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        let mut args: Vec<String> = self.command[1..]
            .iter()
            .map(|a| a.replace("{path}", &path))
            .collect();
        if !self.command.iter().any(|a| a.contains("{path}")) {
            args.push(path.to_string());
        }
        args
    }

    pub async fn show(&self, path: &Path) -> BuddyResult<()> {
        if !path.exists() {
            return Err(BuddyError::Presentation(format!(
                "Image file not found: {}",
                path.display()
            )));
        }
        let abs_path = std::fs::canonicalize(path)?;
        info!("🖼️ Displaying image: {:?}", abs_path);

        let mut current = self.current.lock().await;
        if let Some(child) = current.take() {
            stop_viewer(child).await;
        }

        let child = Command::new(self.program())
            .args(self.args_for(&abs_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BuddyError::Presentation(format!("Failed to start {}: {}", self.program(), e))
            })?;
        debug!("Started viewer process (PID: {:?})", child.id());
        *current = Some(child);
        Ok(())
    }

    /// Kill the viewer, if any
    pub async fn close(&self) -> BuddyResult<()> {
        let mut current = self.current.lock().await;
        if let Some(child) = current.take() {
            info!("🧹 Cleaning up display process...");
            stop_viewer(child).await;
        }
        Ok(())
    }
}

async fn stop_viewer(mut child: Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    debug!("Terminating existing viewer (PID: {:?})", child.id());
    if let Err(e) = child.start_kill() {
        warn!("⚠️ Failed to kill viewer: {}", e);
        return;
    }
    if tokio::time::timeout(VIEWER_EXIT_TIMEOUT, child.wait())
        .await
        .is_err()
    {
        warn!("⚠️ Viewer did not exit within {:?}", VIEWER_EXIT_TIMEOUT);
    }
}
