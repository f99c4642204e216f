//! Language-model providers
//!
//! The synthesizer and the oracle only see [`LanguageModel`]. Concrete
//! providers are an OpenAI-compatible HTTP client, an ordered fallback
//! chain, and a deterministic offline model.

pub mod fallback;
pub mod http;
pub mod offline;

pub use fallback::FallbackChain;
pub use http::OpenAiCompatible;
pub use offline::OfflineModel;

use crate::config::{ProviderConfig, ProviderKind, SynthesisConfig};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A bounded prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self { system: system.into(), user: user.into() }
    }

    /// Size in characters, the unit input budgets are expressed in
    pub fn chars(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Largest prompt accepted, in characters
    fn input_budget(&self) -> usize;

    async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError>;
}

/// Exponential backoff for retryable provider errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// `base * 2^(attempt-1)`, capped
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1 << exp).min(self.max)
    }
}

/// Retry timeouts and rate limits; fail fast on invalid input.
pub async fn complete_with_retry(
    model: &dyn LanguageModel,
    prompt: &Prompt,
    policy: RetryPolicy,
) -> Result<String, ProviderError> {
    if prompt.chars() > model.input_budget() {
        return Err(ProviderError::Invalid(format!(
            "prompt of {} chars exceeds the {} char budget of {}",
            prompt.chars(),
            model.input_budget(),
            model.name()
        )));
    }

    let mut attempt = 1;
    loop {
        match model.complete(prompt).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                warn!(provider = model.name(), attempt, kind = e.kind(), delay_ms = delay.as_millis() as u64, "provider call failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn single_provider(config: &ProviderConfig) -> Option<Arc<dyn LanguageModel>> {
    match config.kind {
        ProviderKind::Offline => Some(Arc::new(OfflineModel::with_budget(config.input_budget_chars))),
        ProviderKind::Openai => {
            let key = std::env::var(&config.api_key_env).ok().filter(|k| !k.trim().is_empty());
            let Some(key) = key else {
                warn!(env = %config.api_key_env, model = %config.model, "no API key set, provider disabled");
                return None;
            };
            match OpenAiCompatible::new(config, key) {
                Ok(provider) => Some(Arc::new(provider)),
                Err(e) => {
                    warn!(model = %config.model, error = %e, "could not build provider");
                    None
                }
            }
        }
    }
}

/// Build the configured provider cascade.
///
/// The primary provider is followed by its fallbacks in order. Providers
/// without credentials are left out; if none remain the offline model is used.
pub fn build_provider(config: &ProviderConfig) -> Arc<dyn LanguageModel> {
    let mut chain: Vec<Arc<dyn LanguageModel>> = std::iter::once(config)
        .chain(config.fallback.iter())
        .filter_map(single_provider)
        .collect();

    match chain.len() {
        0 => {
            info!("using the offline provider");
            Arc::new(OfflineModel::with_budget(config.input_budget_chars))
        }
        1 => chain.remove(0),
        _ => Arc::new(FallbackChain::new(chain)),
    }
}
