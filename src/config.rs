use crate::error::{BuddyError, BuddyResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // OpenAI
    pub openai_api_key: String,
    pub openai_assistant_id: String,
    pub openai_base_url: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub image_model: String,
    pub image_size: String,

    // Stable Diffusion (empty host disables the local provider)
    pub stable_diffusion_host: String,
    pub stable_diffusion_port: u16,
    pub stable_diffusion_steps: u32,
    pub stable_diffusion_cfg_scale: f32,
    pub negative_prompt: String,
    pub default_style: String,
    pub remix_style: String,

    // Display
    pub display_width: u32,
    pub display_height: u32,
    /// Viewer command; `{path}` is replaced with the image path
    pub display_command: Vec<String>,

    // Speech
    pub adapter: String,
    pub wake_word: String,
    pub phrase_time_limit_secs: u64,
    pub assistant_timeout_secs: u64,
    pub network_timeout_secs: u64,
    pub shutdown_grace_secs: u64,

    // Prompts
    pub brief_prompt: String,
    pub assistant_image_prompt: String,
    pub scheduled_image_prompt: String,

    // Notifications
    pub apprise_services: Vec<String>,

    // Data
    pub saved_images_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub assistant_images_dir: PathBuf,
    pub speech_cache_dir: PathBuf,
    pub state_file: PathBuf,

    // Meta
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gptbuddy");

        Self {
            openai_api_key: String::new(),
            openai_assistant_id: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "nova".to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            stable_diffusion_host: String::new(),
            stable_diffusion_port: 7860,
            stable_diffusion_steps: 8,
            stable_diffusion_cfg_scale: 2.0,
            negative_prompt: "ugly, out of frame".to_string(),
            default_style: "lcmxl".to_string(),
            remix_style: "anime".to_string(),
            display_width: 800,
            display_height: 480,
            display_command: vec![
                "sudo".to_string(),
                "fbi".to_string(),
                "-T".to_string(),
                "1".to_string(),
                "{path}".to_string(),
                "--noverbose".to_string(),
            ],
            adapter: "console".to_string(),
            wake_word: "porcupine".to_string(),
            phrase_time_limit_secs: 10,
            assistant_timeout_secs: 10,
            network_timeout_secs: 30,
            shutdown_grace_secs: 10,
            brief_prompt: "Remember to keep responses brief.".to_string(),
            assistant_image_prompt:
                "Create a friendly illustration for this conversation:".to_string(),
            scheduled_image_prompt:
                "Tell me something interesting that happened on this day in history.".to_string(),
            apprise_services: Vec::new(),
            saved_images_dir: data_dir.join("saved_images"),
            audio_dir: data_dir.join("audio"),
            assistant_images_dir: data_dir.join("assistant_images"),
            speech_cache_dir: data_dir.join("speech"),
            state_file: data_dir.join("session.json"),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load config from the default location, or create default
    pub fn load() -> BuddyResult<Self> {
        Self::load_from(&config_path())
    }

    /// Load config from `path`; a corrupt file is moved aside and defaults are used
    pub fn load_from(path: &Path) -> BuddyResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!("⚠️ Config file corrupted or invalid, using defaults: {}", e);
                let backup_path = path.with_extension("json.corrupt");
                let _ = std::fs::rename(path, &backup_path);
                Ok(Self::default())
            }
        }
    }

    /// Save config to file
    pub fn save_to(&self, path: &Path) -> BuddyResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the settings the daemon cannot run without
    pub fn validate(&self) -> BuddyResult<()> {
        if self.openai_api_key.trim().is_empty() {
            return Err(BuddyError::Config(
                "openai_api_key is not configured".to_string(),
            ));
        }
        if self.openai_assistant_id.trim().is_empty() {
            return Err(BuddyError::Config(
                "openai_assistant_id is not configured".to_string(),
            ));
        }
        if self.display_width == 0 || self.display_height == 0 {
            return Err(BuddyError::Config(format!(
                "invalid display size {}x{}",
                self.display_width, self.display_height
            )));
        }
        Ok(())
    }

    /// Stable Diffusion step count, falling back to 8 when out of range
    pub fn sd_steps(&self) -> u32 {
        if (1..=100).contains(&self.stable_diffusion_steps) {
            self.stable_diffusion_steps
        } else {
            tracing::warn!(
                "⚠️ Invalid stable_diffusion_steps {}, using 8",
                self.stable_diffusion_steps
            );
            8
        }
    }

    pub fn local_provider_enabled(&self) -> bool {
        !self.stable_diffusion_host.trim().is_empty() && self.stable_diffusion_port != 0
    }

    pub fn phrase_time_limit(&self) -> Duration {
        Duration::from_secs(self.phrase_time_limit_secs)
    }

    pub fn assistant_timeout(&self) -> Duration {
        Duration::from_secs(self.assistant_timeout_secs)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Directories that must exist before the loop starts
    pub fn required_dirs(&self) -> [&Path; 4] {
        [
            &self.saved_images_dir,
            &self.audio_dir,
            &self.assistant_images_dir,
            &self.speech_cache_dir,
        ]
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gptbuddy")
        .join("config.json")
}
