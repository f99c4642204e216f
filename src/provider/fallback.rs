//! Ordered provider cascade

use super::{LanguageModel, Prompt};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Tries each provider in order, moving on when one is rate limited or
/// times out. Invalid input ends the cascade.
pub struct FallbackChain {
    providers: Vec<Arc<dyn LanguageModel>>,
    name: String,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn LanguageModel>>) -> Self {
        let name = providers.iter().map(|p| p.name()).collect::<Vec<_>>().join(" > ");
        Self { providers, name }
    }
}

#[async_trait]
impl LanguageModel for FallbackChain {
    fn name(&self) -> &str {
        &self.name
    }

    /// Budget of the primary provider; fallbacks with smaller budgets are
    /// skipped for prompts they cannot take.
    fn input_budget(&self) -> usize {
        self.providers.first().map(|p| p.input_budget()).unwrap_or(0)
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let mut last = ProviderError::Invalid("no providers configured".to_string());
        for provider in &self.providers {
            if prompt.chars() > provider.input_budget() {
                continue;
            }
            match provider.complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() => {
                    warn!(provider = provider.name(), kind = e.kind(), "provider unavailable, trying next");
                    last = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedModel;

    #[tokio::test]
    async fn test_falls_through_on_rate_limit() {
        let primary = Arc::new(ScriptedModel::failing_then("primary", vec![ProviderError::RateLimited("429".into())]));
        let backup = Arc::new(ScriptedModel::answering("backup"));
        let chain = FallbackChain::new(vec![primary.clone(), backup.clone()]);

        assert_eq!(chain.complete(&Prompt::new("s", "u")).await.unwrap(), "backup");
        assert_eq!(primary.calls(), 1);
        assert_eq!(backup.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_stops_the_cascade() {
        let primary = Arc::new(ScriptedModel::failing_then("primary", vec![ProviderError::Invalid("bad".into())]));
        let backup = Arc::new(ScriptedModel::answering("backup"));
        let chain = FallbackChain::new(vec![primary, backup.clone()]);

        assert!(chain.complete(&Prompt::new("s", "u")).await.is_err());
        assert_eq!(backup.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_unavailable_returns_last_error() {
        let a = Arc::new(ScriptedModel::failing_then("a", vec![ProviderError::Timeout("slow".into())]));
        let b = Arc::new(ScriptedModel::failing_then("b", vec![ProviderError::RateLimited("429".into())]));
        let chain = FallbackChain::new(vec![a, b]);

        let err = chain.complete(&Prompt::new("s", "u")).await.unwrap_err();
        assert_eq!(err.kind(), "rate_limited");
    }
}
