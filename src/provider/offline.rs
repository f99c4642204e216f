//! Deterministic offline model
//!
//! Used when no API key is configured, and in tests. The completion is a
//! pure function of the prompt: it restates the listed facts.

use super::{LanguageModel, Prompt};
use crate::error::ProviderError;
use async_trait::async_trait;

const DEFAULT_BUDGET: usize = 24_000;
const MAX_FACTS: usize = 12;

#[derive(Debug, Clone)]
pub struct OfflineModel {
    budget: usize,
}

impl Default for OfflineModel {
    fn default() -> Self {
        Self::with_budget(DEFAULT_BUDGET)
    }
}

impl OfflineModel {
    pub fn with_budget(budget: usize) -> Self {
        Self { budget }
    }

    fn render(prompt: &Prompt) -> String {
        let heading = prompt
            .user
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("No context.");
        let facts: Vec<&str> = prompt
            .user
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("- ") || l.starts_with('['))
            .collect();

        let mut out = format!("{heading}\n");
        if facts.is_empty() {
            out.push_str("\nNo structural facts were provided.");
            return out;
        }
        out.push_str(&format!("\nBased on {} structural facts:\n", facts.len()));
        for fact in facts.iter().take(MAX_FACTS) {
            out.push_str(fact);
            out.push('\n');
        }
        if facts.len() > MAX_FACTS {
            out.push_str(&format!("... and {} more\n", facts.len() - MAX_FACTS));
        }
        out
    }
}

#[async_trait]
impl LanguageModel for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    fn input_budget(&self) -> usize {
        self.budget
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        Ok(Self::render(prompt))
    }
}
