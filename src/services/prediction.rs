use anyhow::{Context, Result};
use std::time::Duration;

use crate::models::{ImagePayload, PredictionResponse};

/// Anything that can turn an image into detected food items
#[async_trait::async_trait]
pub trait PredictionService: Send + Sync {
    async fn predict(&self, image: &ImagePayload) -> Result<PredictionResponse>;

    /// Absolute URL for a path returned by the service (e.g. the annotated image)
    fn resolve_url(&self, path: &str) -> String;

    /// Fetch a file served by the service
    async fn download(&self, path: &str) -> Result<Vec<u8>>;
}

/// HTTP client for the `/predict` endpoint
pub struct PredictClient {
    base_url: String,
    client: reqwest::Client,
}

impl PredictClient {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: builder.build().context("Failed to build HTTP client")?,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Web path for an image returned by the service, with a cache-busting timestamp.
///
/// Backslashes become `/` and a single leading `/` is ensured:
/// `results\out.jpg` -> `/results/out.jpg?t=<millis>`.
pub fn result_image_path(path: &str, timestamp_ms: i64) -> String {
    format!("{}?t={}", normalize_web_path(path), timestamp_ms)
}

pub fn normalize_web_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    format!("/{}", path.trim_start_matches('/'))
}

#[async_trait::async_trait]
impl PredictionService for PredictClient {
    async fn predict(&self, image: &ImagePayload) -> Result<PredictionResponse> {
        let url = self.api_url("/predict");
        log::info!(
            "📤 Uploading {} ({}, {} bytes) to {}",
            image.file_name,
            image.mime_type,
            image.bytes.len(),
            url
        );

        let part = reqwest::multipart::Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Prediction request to {} failed", url))?;

        let status = response.status();
        let response_text = response.text().await?;
        log::debug!("📥 Prediction response status: {} ({} bytes)", status, response_text.len());

        // Error responses still carry a JSON body with an `error` field
        match serde_json::from_str::<PredictionResponse>(&response_text) {
            Ok(prediction) => {
                log::info!("✅ Prediction received: {} item(s)", prediction.items.len());
                Ok(prediction)
            }
            Err(e) => {
                log::error!("❌ Prediction service returned a non-JSON body: {}", e);
                anyhow::bail!(
                    "Prediction service error ({}): {}",
                    status,
                    response_text.chars().take(200).collect::<String>()
                );
            }
        }
    }

    fn resolve_url(&self, path: &str) -> String {
        self.api_url(path)
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.api_url(&normalize_web_path(path));
        log::info!("📥 Downloading {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Download of {} failed: HTTP {}", url, response.status());
        }

        Ok(response.bytes().await?.to_vec())
    }
}
