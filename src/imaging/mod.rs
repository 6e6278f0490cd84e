//! Image generation
//!
//! Two interchangeable providers sit behind [`ImageProvider`]:
//! - Hosted: OpenAI Images
//! - Local: Stable Diffusion WebUI
//!
//! [`ImageStudio`] picks one and normalizes its output to PNG bytes at the
//! display size, so the task runner never sees provider-specific formats.

pub mod dalle;
pub mod stable_diffusion;

use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use dalle::DalleProvider;
pub use stable_diffusion::StableDiffusionProvider;

/// Which provider a trigger phrase selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    Hosted,
    Local,
}

/// What to draw
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    /// Style preset; only the local provider understands it
    pub style: Option<String>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            style: None,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }
}

/// PNG bytes at the target size
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Trait for image providers
#[async_trait]
pub trait ImageProvider: Send + Sync + std::fmt::Debug {
    /// Produce encoded image bytes for the request (any format `image` can decode)
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>>;

    /// Health check - verify the provider is reachable
    async fn health_check(&self) -> bool {
        true
    }

    /// Get the provider name
    fn name(&self) -> &str;
}

/// Provider selection plus output normalization
#[derive(Debug, Clone)]
pub struct ImageStudio {
    hosted: Arc<dyn ImageProvider>,
    local: Option<Arc<dyn ImageProvider>>,
    width: u32,
    height: u32,
}

impl ImageStudio {
    pub fn new(
        hosted: Arc<dyn ImageProvider>,
        local: Option<Arc<dyn ImageProvider>>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            hosted,
            local,
            width,
            height,
        }
    }

    /// Build the configured providers
    pub fn from_config(config: &Config) -> Result<Self> {
        let hosted: Arc<dyn ImageProvider> = Arc::new(DalleProvider::new(config)?);
        let local: Option<Arc<dyn ImageProvider>> = if config.local_provider_enabled() {
            info!(
                "🎨 Local Stable Diffusion at {}:{}",
                config.stable_diffusion_host, config.stable_diffusion_port
            );
            Some(Arc::new(StableDiffusionProvider::new(config)?))
        } else {
            info!("🎨 Stable Diffusion not configured, local requests use the hosted provider");
            None
        };
        Ok(Self::new(
            hosted,
            local,
            config.display_width,
            config.display_height,
        ))
    }

    /// Provider for `kind`; local falls back to hosted when not configured
    pub fn provider(&self, kind: ProviderKind) -> Arc<dyn ImageProvider> {
        match (kind, &self.local) {
            (ProviderKind::Local, Some(local)) => local.clone(),
            (ProviderKind::Local, None) => {
                warn!("⚠️ No local image provider, using {}", self.hosted.name());
                self.hosted.clone()
            }
            (ProviderKind::Hosted, _) => self.hosted.clone(),
        }
    }

    /// Raw generation without normalization
    pub async fn fetch(&self, kind: ProviderKind, request: &ImageRequest) -> Result<Vec<u8>> {
        let provider = self.provider(kind);
        info!("🎨 Generating image with {}: '{}'", provider.name(), request.prompt);
        provider.generate(request).await
    }

    /// Decode and resize off the async threads
    pub async fn normalize(&self, bytes: Vec<u8>) -> Result<GeneratedImage> {
        let (width, height) = (self.width, self.height);
        tokio::task::spawn_blocking(move || normalize(&bytes, width, height))
            .await
            .map_err(|e| anyhow::anyhow!("Task join error: {}", e))?
    }

    /// Reachability of every configured provider
    pub async fn health_check(&self) -> Vec<(String, bool)> {
        let mut providers = vec![self.hosted.clone()];
        providers.extend(self.local.clone());
        let checks = providers.iter().map(|p| p.health_check());
        let results = futures::future::join_all(checks).await;
        providers
            .iter()
            .zip(results)
            .map(|(p, ok)| (p.name().to_string(), ok))
            .collect()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Resize any decodable image to exactly `width`x`height` and encode as PNG
pub fn normalize(bytes: &[u8], width: u32, height: u32) -> Result<GeneratedImage> {
    let decoded = image::load_from_memory(bytes).context("Malformed image data")?;
    debug!(
        "Resizing image {}x{} -> {}x{}",
        decoded.width(),
        decoded.height(),
        width,
        height
    );

    let resized = decoded.resize_exact(width, height, FilterType::Triangle);
    let mut png = Vec::new();
    resized
        .write_to(&mut png, image::ImageOutputFormat::Png)
        .context("Failed to encode PNG")?;

    Ok(GeneratedImage { png, width, height })
}
