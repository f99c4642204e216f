//! Query oracle
//!
//! Lexical retrieval, one-hop expansion, then a grounded prompt that lists
//! only the retrieved facts. Questions with no relevant match never reach
//! the provider. Every ask leaves a [`QueryRecord`].

use crate::config::OracleConfig;
use crate::error::ValidationError;
use crate::graph::{GraphVersion, Subgraph, search, terms};
use crate::model::QueryRecord;
use crate::provider::{LanguageModel, Prompt, RetryPolicy, complete_with_retry};
use crate::storage::SqliteStore;
use crate::symbol::{Symbol, SymbolKind};
use crate::uri::SymbolUri;
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info};

const SYSTEM_PROMPT: &str = "You answer questions about a codebase using only the numbered facts provided. \
Cite facts by their number in square brackets. If the facts do not answer the question, say so.";
const PROMPT_OVERHEAD: usize = 256;

/// A fact the answer may cite
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub index: usize,
    pub uri: SymbolUri,
    pub kind: SymbolKind,
    pub qualified_name: String,
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl Citation {
    fn new(index: usize, symbol: &Symbol) -> Self {
        Self {
            index,
            uri: symbol.uri.clone(),
            kind: symbol.kind,
            qualified_name: symbol.qualified_name.clone(),
            path: symbol.path.clone(),
            start_line: symbol.span.start_line,
            end_line: symbol.span.end_line,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer_text: String,
    pub citations: Vec<Citation>,
    /// Graph version the answer was grounded in
    pub version: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AskOutcome {
    Answered(Answer),
    NoContext { version: u64 },
}

impl AskOutcome {
    pub fn is_no_context(&self) -> bool {
        matches!(self, AskOutcome::NoContext { .. })
    }
}

/// Trimmed question, or why it was rejected
pub fn validate_question(question: &str, max_chars: usize) -> std::result::Result<&str, ValidationError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyQuestion);
    }
    if trimmed.chars().count() > max_chars {
        return Err(ValidationError::QuestionTooLong { max: max_chars });
    }
    Ok(trimmed)
}

pub struct Oracle {
    model: Arc<dyn LanguageModel>,
    config: OracleConfig,
    policy: RetryPolicy,
}

impl Oracle {
    pub fn new(model: Arc<dyn LanguageModel>, config: OracleConfig, policy: RetryPolicy) -> Self {
        Self { model, config, policy }
    }

    pub async fn ask(&self, store: &SqliteStore, version: &GraphVersion, question: &str) -> Result<AskOutcome> {
        let question = validate_question(question, self.config.max_question_chars)?;
        let query = terms(question);
        let matches = search(&version.graph, &query, self.config.relevance_threshold, self.config.max_matches);

        let mut record = QueryRecord {
            project_id: version.project_id,
            version: version.version,
            question: question.to_string(),
            subgraph_fingerprint: None,
            answer: None,
            asked_at: Utc::now(),
        };

        if matches.is_empty() {
            debug!(project = %version.project_id, terms = ?query, "no symbol above the relevance threshold");
            store.insert_query_record(&record)?;
            return Ok(AskOutcome::NoContext { version: version.version });
        }

        let subgraph = Subgraph::expand(&version.graph, matches, self.config.max_context_symbols);
        let mut citations: Vec<Citation> = subgraph
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| Citation::new(i + 1, s))
            .collect();

        let budget = self
            .model
            .input_budget()
            .saturating_sub(SYSTEM_PROMPT.chars().count() + PROMPT_OVERHEAD);
        let (user, kept) = grounded_prompt(question, &subgraph, budget);
        if kept < citations.len() {
            debug!(project = %version.project_id, kept, dropped = citations.len() - kept, budget, "facts trimmed to the input budget");
            citations.truncate(kept);
        }
        let prompt = Prompt::new(SYSTEM_PROMPT, user);
        let answer_text = complete_with_retry(self.model.as_ref(), &prompt, self.policy).await?;

        record.subgraph_fingerprint = Some(subgraph.fingerprint());
        record.answer = Some(answer_text.clone());
        store.insert_query_record(&record)?;

        info!(
            project = %version.project_id,
            version = version.version,
            matches = subgraph.matches.len(),
            facts = citations.len(),
            "question answered"
        );
        Ok(AskOutcome::Answered(Answer { answer_text, citations, version: version.version }))
    }
}

/// Numbered facts followed by the relationships between them, cut to
/// `budget` characters. Lower-ranked facts go first; the top match always
/// stays. Returns the prompt and the number of facts kept.
fn grounded_prompt(question: &str, subgraph: &Subgraph<'_>, budget: usize) -> (String, usize) {
    let mut out = format!("Question: {question}\n\nFacts:\n");
    let mut used = out.chars().count();
    let mut kept = 0;
    for (i, symbol) in subgraph.symbols.iter().enumerate() {
        let fact = fact_line(i + 1, symbol);
        let len = fact.chars().count();
        if kept > 0 && used + len > budget {
            break;
        }
        out.push_str(&fact);
        used += len;
        kept += 1;
    }

    let numbers: HashMap<&SymbolUri, usize> =
        subgraph.symbols[..kept].iter().enumerate().map(|(i, s)| (&s.uri, i + 1)).collect();
    let relations: Vec<String> = subgraph
        .edges
        .iter()
        .filter_map(|e| {
            let from = numbers.get(&e.from_uri)?;
            let to = numbers.get(e.to_uri()?)?;
            Some(format!("[{from}] {} [{to}]\n", e.kind))
        })
        .collect();

    const HEADING: &str = "\nRelationships:\n";
    if !relations.is_empty() && used + HEADING.len() + relations[0].len() <= budget {
        out.push_str(HEADING);
        used += HEADING.len();
        for line in relations {
            if used + line.len() > budget {
                break;
            }
            used += line.len();
            out.push_str(&line);
        }
    }
    (out, kept)
}

fn fact_line(number: usize, symbol: &Symbol) -> String {
    let mut line = format!("[{number}] {} {}", symbol.kind, symbol.qualified_name);
    if let Some(sig) = &symbol.signature {
        let _ = write!(line, " {sig}");
    }
    let _ = writeln!(line, " ({}:{}-{})", symbol.path, symbol.span.start_line, symbol.span.end_line);
    if let Some(doc) = symbol.doc.as_deref().and_then(|d| d.lines().next()) {
        let _ = writeln!(line, "    doc: {doc}");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{extract_file, registry};
    use crate::config::ExtractConfig;
    use crate::graph::build_graph;
    use crate::model::Project;
    use crate::provider::testing::ScriptedModel;
    use std::time::Duration;
    use uuid::Uuid;

    const AUTH: &str = "def validate_token(token):\n    \"\"\"Check a session token.\"\"\"\n    return decode(token)\n\ndef decode(raw):\n    return raw\n";

    fn setup() -> (SqliteStore, GraphVersion) {
        let store = SqliteStore::open_in_memory().unwrap();
        let project = Project::new("https://github.com/o/r");
        store.insert_project(&project).unwrap();
        let extraction = extract_file(registry(), &project.id.to_string(), "auth.py", AUTH.as_bytes(), &ExtractConfig::default());
        let version = GraphVersion::new(project.id, 1, Uuid::new_v4(), "h", build_graph(vec![extraction]));
        (store, version)
    }

    fn oracle(model: Arc<ScriptedModel>) -> Oracle {
        let policy = RetryPolicy { max_attempts: 2, base: Duration::from_millis(1), max: Duration::from_millis(1) };
        Oracle::new(model, OracleConfig::default(), policy)
    }

    #[test]
    fn test_validate_question() {
        assert_eq!(validate_question("  why?  ", 10).unwrap(), "why?");
        assert_eq!(validate_question("   ", 10), Err(ValidationError::EmptyQuestion));
        assert_eq!(validate_question(&"x".repeat(11), 10), Err(ValidationError::QuestionTooLong { max: 10 }));
    }

    #[tokio::test]
    async fn test_answer_cites_retrieved_symbols() {
        let (store, version) = setup();
        let model = Arc::new(ScriptedModel::answering("It decodes the token [1]."));
        let outcome = oracle(model.clone()).ask(&store, &version, "How is a token validated?").await.unwrap();

        let AskOutcome::Answered(answer) = outcome else { panic!("expected an answer") };
        assert_eq!(answer.citations[0].qualified_name, "validate_token");
        assert!(answer.citations.iter().any(|c| c.qualified_name == "decode"));
        assert_eq!(answer.citations[0].path, "auth.py");
        assert_eq!(model.calls(), 1);

        let records = store.query_records(version.project_id).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].subgraph_fingerprint.is_some());
    }

    #[tokio::test]
    async fn test_no_overlap_skips_provider() {
        let (store, version) = setup();
        let model = Arc::new(ScriptedModel::answering("unused"));
        let outcome = oracle(model.clone()).ask(&store, &version, "Where is the billing queue?").await.unwrap();

        assert!(outcome.is_no_context());
        assert_eq!(model.calls(), 0);
        let records = store.query_records(version.project_id).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].answer.is_none());
    }

    #[tokio::test]
    async fn test_invalid_question_is_rejected_before_retrieval() {
        let (store, version) = setup();
        let model = Arc::new(ScriptedModel::answering("unused"));
        let err = oracle(model).ask(&store, &version, "   ").await.unwrap_err();
        assert!(matches!(err, crate::Error::Validation(ValidationError::EmptyQuestion)));
        assert!(store.query_records(version.project_id).unwrap().is_empty());
    }

    #[test]
    fn test_prompt_lists_relationships_by_number() {
        let (_, version) = setup();
        let matches = search(&version.graph, &terms("validate token"), 1.0, 8);
        let subgraph = Subgraph::expand(&version.graph, matches, 10);
        let (prompt, kept) = grounded_prompt("q", &subgraph, usize::MAX);
        assert_eq!(kept, subgraph.symbols.len());
        assert!(prompt.contains("[1] function validate_token (token) (auth.py:1-3)"));
        assert!(prompt.contains("    doc: Check a session token."));
        assert!(prompt.contains("calls ["));
    }

    #[test]
    fn test_prompt_drops_lowest_ranked_facts_first() {
        let (_, version) = setup();
        let matches = search(&version.graph, &terms("validate token"), 1.0, 8);
        let subgraph = Subgraph::expand(&version.graph, matches, 10);
        assert!(subgraph.symbols.len() > 1);

        let (full, _) = grounded_prompt("q", &subgraph, usize::MAX);
        let (first_only, kept) = grounded_prompt("q", &subgraph, 60);
        assert_eq!(kept, 1);
        assert!(first_only.contains("[1] function validate_token"));
        assert!(!first_only.contains("[2]"));
        assert!(!first_only.contains("Relationships:"));
        assert!(first_only.len() < full.len());

        // the top match survives a budget smaller than itself
        let (_, kept) = grounded_prompt("q", &subgraph, 0);
        assert_eq!(kept, 1);
    }

    #[tokio::test]
    async fn test_citations_follow_the_trimmed_prompt() {
        let (store, version) = setup();
        let mut scripted = ScriptedModel::answering("It decodes the token [1].");
        scripted.budget = SYSTEM_PROMPT.chars().count() + PROMPT_OVERHEAD + 80;
        let model = Arc::new(scripted);
        let outcome = oracle(model.clone()).ask(&store, &version, "How is a token validated?").await.unwrap();

        let AskOutcome::Answered(answer) = outcome else { panic!("expected an answer") };
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].qualified_name, "validate_token");
        assert_eq!(model.calls(), 1);
    }
}
