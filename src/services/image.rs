use crate::config::Config;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("HUGGINGFACE_API_TOKEN is not set")]
    MissingToken,
    #[error("Failed to generate image: {status} {body}")]
    Api { status: u16, body: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Text-to-image through the HuggingFace inference API.
pub struct ImageGenerator {
    http: reqwest::Client,
    model_url: String,
    token: Option<String>,
}

impl ImageGenerator {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            model_url: config.image_model_url.clone(),
            token: config.huggingface_api_token.clone(),
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<Vec<u8>, ImageError> {
        let token = self.token.as_deref().ok_or(ImageError::MissingToken)?;

        info!(model = %self.model_url, "Requesting image generation");
        let response = self
            .http
            .post(&self.model_url)
            .bearer_auth(token)
            .json(&InferenceRequest { inputs: prompt })
            .timeout(GENERATION_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Re-encode whatever the model returned as PNG.
pub fn to_png(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    let image = image::load_from_memory(bytes)?;
    let mut png = Vec::new();
    image.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;
    Ok(png)
}

/// `進度: [████------] 40%`
pub fn progress_bar(step: u32, total_steps: u32) -> String {
    let progress = if total_steps == 0 {
        100
    } else {
        (step.min(total_steps) * 100 / total_steps) as usize
    };
    let filled = progress / 10;
    format!(
        "進度: [{}{}] {}%",
        "█".repeat(filled),
        "-".repeat(10 - filled),
        progress
    )
}
