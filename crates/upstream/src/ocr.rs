use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::OcrConfig;
use crate::error::UpstreamError;

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: String,
}

/// Sends image bytes to the configured text-extraction service.
#[derive(Debug, Clone)]
pub struct HttpOcrClient {
    config: OcrConfig,
    http: Client,
}

impl HttpOcrClient {
    pub fn new(config: OcrConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    pub fn is_configured(&self) -> bool {
        self.config.url.is_some()
    }

    /// Raw extracted text, trimmed. Empty when nothing was recognised.
    pub async fn extract_text(
        &self,
        image: Vec<u8>,
        content_type: &str,
    ) -> Result<String, UpstreamError> {
        let url = self
            .config
            .url
            .as_deref()
            .ok_or(UpstreamError::NotConfigured("OCR endpoint"))?;

        info!(bytes = image.len(), content_type = %content_type, "extracting text from image");
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(image)
            .send()
            .await
            .inspect_err(|error| warn!(error = %error, "ocr request failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OcrResponse = response.json().await?;
        Ok(parsed.text.trim().to_string())
    }
}
