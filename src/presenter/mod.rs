//! Response presenter
//!
//! Plays audio files and shows one image at a time. The controller and the
//! background tasks depend only on the [`Presenter`] trait.

pub mod display;
pub mod sound;

use crate::config::Config;
use crate::error::{BuddyError, BuddyResult};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use tracing::info;

pub use display::ImageDisplay;
pub use sound::SoundEngine;

/// Trait for audio/image output
#[async_trait]
pub trait Presenter: Send + Sync + std::fmt::Debug {
    /// Play an audio file, returning once playback ends
    async fn play_audio(&self, path: &Path) -> BuddyResult<()>;

    /// Replace whatever image is on screen
    async fn display_image(&self, path: &Path) -> BuddyResult<()>;

    /// Release the display
    async fn clear(&self) -> BuddyResult<()> {
        Ok(())
    }
}

/// Speakers plus framebuffer viewer
#[derive(Debug)]
pub struct FramebufferPresenter {
    sound: SoundEngine,
    display: ImageDisplay,
}

impl FramebufferPresenter {
    pub fn new(config: &Config) -> BuddyResult<Self> {
        let sound = SoundEngine::new()?;
        let viewer = ImageDisplay::new(config.display_command.clone())?;
        let program = viewer.program().to_string();
        info!("🖼️ Presenter ready ({})", program);
        Ok(Self {
            sound,
            display: viewer,
        })
    }
}

#[async_trait]
impl Presenter for FramebufferPresenter {
    async fn play_audio(&self, path: &Path) -> BuddyResult<()> {
        if !path.exists() {
            return Err(BuddyError::Presentation(format!(
                "Audio file not found: {}",
                path.display()
            )));
        }

        let sound = self.sound.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || sound.play_file_sync(path))
            .await
            .map_err(|e| BuddyError::Presentation(format!("Task join error: {}", e)))?
    }

    async fn display_image(&self, path: &Path) -> BuddyResult<()> {
        self.display.show(path).await
    }

    async fn clear(&self) -> BuddyResult<()> {
        let _ = self.sound.stop();
        self.display.close().await
    }
}

/// Canned audio clips and status images
#[derive(Debug, Clone)]
pub struct Cues {
    pub wake: Vec<PathBuf>,
    pub acknowledge: Vec<PathBuf>,
    pub thinking: PathBuf,
    pub sending: PathBuf,
    pub listening_image: PathBuf,
    pub thinking_image: PathBuf,
}

impl Cues {
    pub fn from_config(config: &Config) -> Self {
        let audio = |name: &str| config.audio_dir.join(name);
        let image = |name: &str| config.assistant_images_dir.join(name);
        Self {
            wake: vec![audio("what.mp3"), audio("yes_question.mp3")],
            acknowledge: vec![audio("oh_ok.mp3"), audio("alright_then.mp3")],
            thinking: audio("hmm.mp3"),
            sending: audio("sending_image.mp3"),
            listening_image: image("listening.png"),
            thinking_image: image("thinking.png"),
        }
    }

    pub fn random_wake(&self) -> Option<&Path> {
        self.wake
            .choose(&mut rand::thread_rng())
            .map(PathBuf::as_path)
    }

    pub fn random_acknowledge(&self) -> Option<&Path> {
        self.acknowledge
            .choose(&mut rand::thread_rng())
            .map(PathBuf::as_path)
    }
}
