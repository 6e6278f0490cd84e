#![allow(dead_code)]

pub mod mock_adapter;
pub mod mock_services;
pub mod mock_tts;

use gptbuddy::config::Config;
use gptbuddy::controller::{Services, SessionController};
use gptbuddy::imaging::{ImageProvider, ImageStudio};
use mock_services::{MockBackend, MockImageProvider, MockNotifier, MockPresenter};
use mock_tts::MockSpeech;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Isolated config plus the mocks behind every seam
pub struct TestContext {
    pub temp_dir: TempDir,
    pub config: Config,
    pub backend: Arc<MockBackend>,
    pub hosted: Arc<MockImageProvider>,
    pub local: Arc<MockImageProvider>,
    pub speech: Arc<MockSpeech>,
    pub presenter: Arc<MockPresenter>,
    pub notifier: Arc<MockNotifier>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_backend(MockBackend::new("Foxes are clever."))
    }

    pub fn with_backend(backend: MockBackend) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();

        let mut config = Config::default();
        config.saved_images_dir = root.join("saved_images");
        config.audio_dir = root.join("audio");
        config.assistant_images_dir = root.join("assistant_images");
        config.speech_cache_dir = root.join("speech");
        config.state_file = root.join("session.json");
        config.display_width = 64;
        config.display_height = 32;
        config.assistant_timeout_secs = 10;
        config.shutdown_grace_secs = 2;
        for dir in config.required_dirs() {
            std::fs::create_dir_all(dir).expect("Failed to create dir");
        }

        Self {
            temp_dir,
            config,
            backend: Arc::new(backend),
            hosted: Arc::new(MockImageProvider::new("mock-hosted")),
            local: Arc::new(MockImageProvider::new("mock-local")),
            speech: Arc::new(MockSpeech::new()),
            presenter: Arc::new(MockPresenter::new()),
            notifier: Arc::new(MockNotifier::new()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            backend: self.backend.clone(),
            studio: ImageStudio::new(
                self.hosted.clone(),
                Some(self.local.clone() as Arc<dyn ImageProvider>),
                self.config.display_width,
                self.config.display_height,
            ),
            speech: self.speech.clone(),
            presenter: self.presenter.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn controller(&self) -> SessionController {
        SessionController::new(&self.config, self.services()).expect("Failed to build controller")
    }

    /// Visible files in the managed image directory
    pub fn saved_images(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.config.saved_images_dir)
            .expect("read_dir")
            .map(|e| e.expect("entry").path())
            .collect();
        files.sort();
        files
    }
}

/// Smallest valid PNG the image pipeline accepts
pub fn tiny_png() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 3));
    let mut out = Vec::new();
    img.write_to(&mut out, image::ImageOutputFormat::Png)
        .expect("encode");
    out
}
