//! Documentation synthesizer
//!
//! Walks a graph version's files (then the whole project) and writes one
//! summary and one reference document per target. A target whose source
//! fingerprint matches its latest generated document is left alone.

use super::context::{SynthesisContext, assemble, source_fingerprint};
use crate::config::SynthesisConfig;
use crate::graph::GraphVersion;
use crate::model::{Document, DocumentKind, DocumentStatus, DocumentTarget};
use crate::provider::{LanguageModel, Prompt, RetryPolicy, complete_with_retry};
use crate::storage::SqliteStore;
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You are documenting a codebase. Use only the structural facts provided. \
Do not invent symbols, files or behaviour that the facts do not show. Be concise.";

/// Space kept free for the prompt's framing lines
const PROMPT_OVERHEAD: usize = 256;

/// Outcome of one synthesis pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SynthesisReport {
    pub generated: usize,
    pub reused: usize,
    pub failed: usize,
    /// Set when at least one document could not be generated
    pub warning: Option<String>,
}

impl std::fmt::Display for SynthesisReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} generated, {} reused, {} failed", self.generated, self.reused, self.failed)
    }
}

enum TargetOutcome {
    Generated,
    Reused,
    Skipped,
    Failed,
}

pub struct Synthesizer {
    model: Arc<dyn LanguageModel>,
    config: SynthesisConfig,
    policy: RetryPolicy,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, config: SynthesisConfig) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self { model, config, policy }
    }

    /// Context budget: the configured ceiling, shrunk to fit the model's input budget
    fn context_budget(&self) -> usize {
        let room = self
            .model
            .input_budget()
            .saturating_sub(SYSTEM_PROMPT.chars().count() + PROMPT_OVERHEAD);
        self.config.max_context_chars.min(room)
    }

    /// Documents for every parsed file, then the project.
    pub async fn synthesize(&self, store: &SqliteStore, version: &GraphVersion) -> Result<SynthesisReport> {
        let mut targets: Vec<DocumentTarget> = version
            .files
            .iter()
            .filter(|f| f.status.has_symbols())
            .map(|f| DocumentTarget::File(f.path.clone()))
            .collect();
        targets.push(DocumentTarget::Project);

        let mut report = SynthesisReport::default();
        for target in &targets {
            for kind in [DocumentKind::Summary, DocumentKind::Reference] {
                match self.synthesize_target(store, version, target, kind).await? {
                    TargetOutcome::Generated => report.generated += 1,
                    TargetOutcome::Reused => report.reused += 1,
                    TargetOutcome::Failed => report.failed += 1,
                    TargetOutcome::Skipped => {}
                }
            }
        }

        if report.failed > 0 {
            report.warning = Some(format!("{} document(s) could not be generated", report.failed));
        }
        info!(project = %version.project_id, version = version.version, %report, "synthesis finished");
        Ok(report)
    }

    /// Generate one document unless its inputs are unchanged.
    ///
    /// Returns whether a newly generated document was stored.
    pub async fn synthesize_one(
        &self,
        store: &SqliteStore,
        version: &GraphVersion,
        target: &DocumentTarget,
        kind: DocumentKind,
    ) -> Result<bool> {
        let outcome = self.synthesize_target(store, version, target, kind).await?;
        Ok(matches!(outcome, TargetOutcome::Generated))
    }

    async fn synthesize_target(
        &self,
        store: &SqliteStore,
        version: &GraphVersion,
        target: &DocumentTarget,
        kind: DocumentKind,
    ) -> Result<TargetOutcome> {
        let budget = self.context_budget();
        let fingerprint = source_fingerprint(version, target, kind, budget);

        if let Some(latest) = store.latest_document_for(version.project_id, target, kind, version.version)? {
            if latest.source_fingerprint == fingerprint {
                debug!(target = %target, kind = kind.as_str(), version = latest.version, "document unchanged");
                return Ok(TargetOutcome::Reused);
            }
        }

        let context = assemble(&version.graph, target, budget);
        if context.is_empty() {
            return Ok(TargetOutcome::Skipped);
        }

        let result = match kind {
            DocumentKind::Reference => Ok(render_reference(&context)),
            DocumentKind::Summary => {
                let prompt = Prompt::new(SYSTEM_PROMPT, summary_prompt(&context));
                complete_with_retry(self.model.as_ref(), &prompt, self.policy).await
            }
        };

        let mut doc = Document {
            project_id: version.project_id,
            target: target.clone(),
            kind,
            version: version.version,
            status: DocumentStatus::Generated,
            content: None,
            source_fingerprint: fingerprint,
            error: None,
            created_at: Utc::now(),
        };

        let outcome = match result {
            Ok(text) => {
                doc.content = Some(text);
                TargetOutcome::Generated
            }
            Err(e) => {
                warn!(target = %target, provider = self.model.name(), error = %e, "document generation failed");
                doc.status = DocumentStatus::Failed;
                doc.error = Some(e.to_string());
                TargetOutcome::Failed
            }
        };
        store.insert_document(&doc)?;
        Ok(outcome)
    }
}

fn describe(target: &DocumentTarget) -> String {
    match target {
        DocumentTarget::File(path) => format!("file {path}"),
        DocumentTarget::Module(name) => format!("module {name}"),
        DocumentTarget::Project => "the project".to_string(),
    }
}

fn summary_prompt(context: &SynthesisContext) -> String {
    let mut prompt = format!(
        "Summarize {} from these structural facts ({} symbols).\n\n{}",
        describe(&context.target),
        context.included,
        context.text
    );
    if context.truncated() {
        prompt.push_str(&format!(
            "\n({} lower-ranked symbols were left out of this context.)\n",
            context.omitted
        ));
    }
    prompt
}

fn render_reference(context: &SynthesisContext) -> String {
    let mut out = format!("# Reference: {}\n\n{}", describe(&context.target), context.text);
    if context.truncated() {
        out.push_str(&format!("\n... {} more symbols not listed\n", context.omitted));
    }
    out
}
