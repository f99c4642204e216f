//! OpenAI-compatible chat completions client

use super::{LanguageModel, Prompt};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

/// Calls `<base_url>/chat/completions`.
///
/// Error mapping:
/// - request timeout, network error or HTTP 5xx → `Timeout`
/// - HTTP 429 → `RateLimited`
/// - any other 4xx or a malformed body → `Invalid`
pub struct OpenAiCompatible {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    input_budget: usize,
}

impl OpenAiCompatible {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Invalid(format!("http client: {e}")))?;

        Ok(Self {
            client,
            name: format!("openai:{}", config.model),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            input_budget: config.input_budget_chars,
        })
    }

    fn map_send_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else if e.is_builder() {
            ProviderError::Invalid(e.to_string())
        } else {
            ProviderError::Timeout(format!("network error: {e}"))
        }
    }

    fn parse_response(body: &str) -> Result<String, ProviderError> {
        let parsed: ChatResponse =
            serde_json::from_str(body).map_err(|e| ProviderError::Invalid(format!("unexpected response body: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::Invalid("response carried no completion".to_string()))
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatible {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_budget(&self) -> usize {
        self.input_budget
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        let text = response.text().await.map_err(Self::map_send_error)?;
        debug!(provider = %self.name, status = status.as_u16(), bytes = text.len(), "completion response");

        if status.is_success() {
            return Self::parse_response(&text);
        }
        let detail = format!("HTTP {}: {}", status.as_u16(), text.chars().take(200).collect::<String>());
        if status.as_u16() == 429 {
            Err(ProviderError::RateLimited(detail))
        } else if status.is_server_error() {
            Err(ProviderError::Timeout(detail))
        } else {
            Err(ProviderError::Invalid(detail))
        }
    }
}
