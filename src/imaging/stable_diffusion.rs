//! Local image provider talking to a Stable Diffusion WebUI instance

use super::{ImageProvider, ImageRequest};
use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    images: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StableDiffusionProvider {
    client: reqwest::Client,
    url: String,
    steps: u32,
    cfg_scale: f32,
    width: u32,
    height: u32,
    negative_prompt: String,
    default_style: String,
    timeout: Duration,
}

impl StableDiffusionProvider {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            url: format!(
                "http://{}:{}",
                config.stable_diffusion_host, config.stable_diffusion_port
            ),
            steps: config.sd_steps(),
            cfg_scale: config.stable_diffusion_cfg_scale,
            width: config.display_width,
            height: config.display_height,
            negative_prompt: config.negative_prompt.clone(),
            default_style: config.default_style.clone(),
            timeout: config.network_timeout(),
        })
    }

    /// Request body for `/sdapi/v1/txt2img`
    fn body(&self, request: &ImageRequest) -> serde_json::Value {
        let style = request
            .style
            .clone()
            .unwrap_or_else(|| self.default_style.clone());

        serde_json::json!({
            "prompt": request.prompt,
            "negative_prompt": self.negative_prompt,
            "width": self.width,
            "height": self.height,
            "steps": self.steps,
            "cfg_scale": self.cfg_scale,
            "styles": [style],
        })
    }
}

#[async_trait]
impl ImageProvider for StableDiffusionProvider {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>> {
        let body = self.body(request);
        debug!("txt2img request: {}", body);

        let response = self
            .client
            .post(format!("{}/sdapi/v1/txt2img", self.url))
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("❌ Stable Diffusion error ({}): {}", status, text);
            anyhow::bail!("Stable Diffusion returned {}", status);
        }

        let parsed: Txt2ImgResponse = response.json().await?;
        let encoded = parsed
            .images
            .into_iter()
            .next()
            .context("Stable Diffusion returned no images")?;

        // Some WebUI builds prefix a data URL header
        let payload = encoded
            .split_once(',')
            .map(|(_, data)| data)
            .unwrap_or(&encoded);

        base64::engine::general_purpose::STANDARD
            .decode(payload.as_bytes())
            .context("Stable Diffusion returned invalid base64")
    }

    /// Health check - verify the WebUI is reachable
    async fn health_check(&self) -> bool {
        match self
            .client
            .get(&self.url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        "stable-diffusion"
    }
}
