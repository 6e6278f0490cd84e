//! Hosted image provider (OpenAI Images API)

use super::{ImageProvider, ImageRequest};
use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DalleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    size: String,
    timeout: Duration,
}

impl DalleProvider {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
            model: config.image_model.clone(),
            size: config.image_size.clone(),
            timeout: config.network_timeout(),
        })
    }
}

#[async_trait]
impl ImageProvider for DalleProvider {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>> {
        debug!("Image prompt: {:.100}", request.prompt);

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": request.prompt,
                "size": self.size,
                "quality": "standard",
                "n": 1,
                "response_format": "b64_json"
            }))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("❌ Images API error ({}): {}", status, body);
            anyhow::bail!("Images API returned {}", status);
        }

        let parsed: ImagesResponse = response.json().await?;
        let encoded = parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .context("Images API response had no image data")?;

        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .context("Images API returned invalid base64")
    }

    fn name(&self) -> &str {
        "dall-e"
    }
}
