use mathgate_core::ChatMessage;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::CompletionConfig;
use crate::error::UpstreamError;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

pub trait CompletionEngine: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<String, UpstreamError>;
}

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    config: CompletionConfig,
    http: Client,
}

impl HttpCompletionClient {
    pub fn new(config: CompletionConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(6))
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, http })
    }
}

impl CompletionEngine for HttpCompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<String, UpstreamError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(UpstreamError::NotConfigured("completion API key"))?;

        let payload = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": options.temperature.unwrap_or(self.config.default_temperature),
            "max_tokens": options.max_tokens.unwrap_or(self.config.max_tokens),
        });

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .inspect_err(|error| warn!(error = %error, "completion request failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "completion request rejected");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        let content = extract_message_content(&body)
            .ok_or_else(|| UpstreamError::Decode("completion content missing".to_string()))?;

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

pub fn extract_message_content(payload: &Value) -> Option<String> {
    payload
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}
