//! Core adapter framework
//!
//! Defines the capability trait every language adapter implements, the
//! static dispatch table, and the driver that turns one file's bytes into a
//! `FileRecord` plus symbols and raw references.

use crate::config::ExtractConfig;
use crate::edge::EdgeKind;
use crate::language::{Language, module_path};
use crate::model::{FileRecord, ParseStatus, Snapshot};
use crate::symbol::Symbol;
use crate::uri::SymbolUri;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Why a file produced no syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no extractor for {0}")]
    Unsupported(Language),

    #[error("grammar could not be loaded: {0}")]
    Grammar(String),

    #[error("syntax error at line {line}, column {column}")]
    Syntax { line: u32, column: u32 },

    #[error("parser produced no tree")]
    NoTree,
}

/// A parsed file: the tree-sitter tree plus the text it was parsed from.
pub struct SyntaxTree {
    tree: tree_sitter::Tree,
    source: String,
}

impl SyntaxTree {
    pub fn new(tree: tree_sitter::Tree, source: String) -> Self {
        Self { tree, source }
    }

    pub fn root(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Identity of the file being extracted.
#[derive(Debug, Clone)]
pub struct FileContext {
    pub project: String,
    pub path: String,
    /// Dotted module path derived from `path`
    pub module_path: String,
}

impl FileContext {
    pub fn new(project: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            project: project.into(),
            module_path: module_path(&path),
            path,
        }
    }

    /// Directory part of the path, `""` at the snapshot root
    pub fn dir(&self) -> &str {
        self.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }
}

/// A name used at some site, not yet bound to a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReference {
    /// Innermost symbol enclosing the reference site
    pub from: SymbolUri,
    pub kind: EdgeKind,
    pub name: String,
    /// `obj` in `obj.method()` or `Type` in `Type::new()`
    pub receiver: Option<String>,
    /// Module path named by an import, used to narrow candidates
    pub module: Option<String>,
    /// Local alias introduced by an import
    pub alias: Option<String>,
    pub line: u32,
}

impl RawReference {
    pub fn new(from: SymbolUri, kind: EdgeKind, name: impl Into<String>, line: u32) -> Self {
        Self {
            from,
            kind,
            name: name.into(),
            receiver: None,
            module: None,
            alias: None,
            line,
        }
    }

    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias;
        self
    }
}

/// Capability set of a language adapter.
///
/// `extract_symbols` must place the file's module symbol first.
/// `extract_references` receives those symbols to attribute each site to
/// its innermost enclosing symbol.
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;

    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError>;

    fn extract_symbols(&self, ctx: &FileContext, tree: &SyntaxTree) -> Vec<Symbol>;

    fn extract_references(&self, ctx: &FileContext, tree: &SyntaxTree, symbols: &[Symbol]) -> Vec<RawReference>;
}

/// Adapter for languages without an extractor. Every parse is refused.
pub struct NoopAdapter;

impl LanguageAdapter for NoopAdapter {
    fn language(&self) -> Language {
        Language::Unknown
    }

    fn parse(&self, _source: &str) -> Result<SyntaxTree, ParseError> {
        Err(ParseError::Unsupported(Language::Unknown))
    }

    fn extract_symbols(&self, _ctx: &FileContext, _tree: &SyntaxTree) -> Vec<Symbol> {
        Vec::new()
    }

    fn extract_references(&self, _ctx: &FileContext, _tree: &SyntaxTree, _symbols: &[Symbol]) -> Vec<RawReference> {
        Vec::new()
    }
}

/// Static language → adapter table
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn LanguageAdapter>>,
    fallback: NoopAdapter,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self { adapters: Vec::new(), fallback: NoopAdapter }
    }

    pub fn register(&mut self, adapter: impl LanguageAdapter + 'static) {
        self.adapters.push(Box::new(adapter));
    }

    /// Adapter for a language; the no-op adapter when none is registered
    pub fn adapter_for(&self, language: Language) -> &dyn LanguageAdapter {
        self.adapters
            .iter()
            .find(|a| a.language() == language)
            .map(|a| a.as_ref())
            .unwrap_or(&self.fallback)
    }

    pub fn supports(&self, language: Language) -> bool {
        self.adapters.iter().any(|a| a.language() == language)
    }

    pub fn languages(&self) -> Vec<Language> {
        self.adapters.iter().map(|a| a.language()).collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with all built-in adapters
pub fn default_registry() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register(super::python::PythonAdapter);
    registry.register(super::javascript::JavaScriptAdapter);
    registry.register(super::rust::RustAdapter);
    registry.register(super::go::GoAdapter);
    registry
}

static REGISTRY: LazyLock<AdapterRegistry> = LazyLock::new(default_registry);

/// Process-wide built-in table. Adapters are stateless.
pub fn registry() -> &'static AdapterRegistry {
    &REGISTRY
}

/// Everything extracted from one file.
#[derive(Debug, Clone)]
pub struct FileExtraction {
    pub record: FileRecord,
    pub symbols: Vec<Symbol>,
    pub references: Vec<RawReference>,
}

impl FileExtraction {
    fn without_symbols(record: FileRecord) -> Self {
        Self { record, symbols: Vec::new(), references: Vec::new() }
    }
}

/// Extract one file. Never fails: problems are recorded on the `FileRecord`.
pub fn extract_file(
    registry: &AdapterRegistry,
    project: &str,
    path: &str,
    bytes: &[u8],
    limits: &ExtractConfig,
) -> FileExtraction {
    let language = Language::from_path(Path::new(path));
    let content_hash = blake3::hash(bytes).to_hex().to_string();
    let record = FileRecord::new(path, language, content_hash);

    if !registry.supports(language) {
        return FileExtraction::without_symbols(
            record.with_status(ParseStatus::Skipped, format!("unsupported language: {language}")),
        );
    }

    if bytes.len() as u64 > limits.max_file_bytes {
        return FileExtraction::without_symbols(record.with_status(
            ParseStatus::Skipped,
            format!("file is {} bytes, above the {} byte ceiling", bytes.len(), limits.max_file_bytes),
        ));
    }

    let mut notes = Vec::new();
    let source = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => {
            notes.push(format!("invalid UTF-8 at byte {}, decoded lossily", e.valid_up_to()));
            String::from_utf8_lossy(bytes).into_owned()
        }
    };

    let adapter = registry.adapter_for(language);
    let tree = match adapter.parse(&source) {
        Ok(tree) => tree,
        Err(ParseError::Unsupported(lang)) => {
            return FileExtraction::without_symbols(
                record.with_status(ParseStatus::Skipped, format!("unsupported language: {lang}")),
            );
        }
        Err(e) => {
            debug!(path, error = %e, "parse failed");
            return FileExtraction::without_symbols(record.with_status(ParseStatus::Failed, e.to_string()));
        }
    };

    let ctx = FileContext::new(project, path);
    let mut symbols = adapter.extract_symbols(&ctx, &tree);
    if symbols.len() > limits.max_symbols_per_file {
        symbols.truncate(limits.max_symbols_per_file);
        notes.push(format!("symbol ceiling of {} reached, extraction stopped early", limits.max_symbols_per_file));
    }

    let mut references = adapter.extract_references(&ctx, &tree, &symbols);
    let kept: HashSet<&SymbolUri> = symbols.iter().map(|s| &s.uri).collect();
    references.retain(|r| kept.contains(&r.from));

    let record = if notes.is_empty() {
        record
    } else {
        record.with_status(ParseStatus::Partial, notes.join("; "))
    };

    debug!(path, symbols = symbols.len(), references = references.len(), "extracted");
    FileExtraction { record, symbols, references }
}

/// Extract every file of a snapshot in manifest (sorted path) order.
///
/// Blocking; the orchestrator runs it on a blocking thread.
pub fn extract_snapshot(registry: &AdapterRegistry, snapshot: &Snapshot, limits: &ExtractConfig) -> Vec<FileExtraction> {
    let project = snapshot.project_id.to_string();
    let mut files: Vec<&str> = snapshot.files.iter().map(|f| f.path.as_str()).collect();
    files.sort_unstable();

    files
        .into_iter()
        .map(|path| match std::fs::read(snapshot.root.join(path)) {
            Ok(bytes) => extract_file(registry, &project, path, &bytes, limits),
            Err(e) => {
                warn!(path, error = %e, "could not read snapshot file");
                let language = Language::from_path(Path::new(path));
                let hash = snapshot
                    .files
                    .iter()
                    .find(|f| f.path == path)
                    .map(|f| f.content_hash.clone())
                    .unwrap_or_default();
                FileExtraction::without_symbols(
                    FileRecord::new(path, language, hash).with_status(ParseStatus::Failed, format!("read error: {e}")),
                )
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ExtractConfig {
        ExtractConfig::default()
    }

    #[test]
    fn test_registry_dispatch() {
        let registry = default_registry();
        assert!(registry.supports(Language::Python));
        assert!(registry.supports(Language::Go));
        assert!(!registry.supports(Language::Markdown));
        assert_eq!(registry.adapter_for(Language::Markdown).language(), Language::Unknown);
    }

    #[test]
    fn test_unsupported_file_is_skipped() {
        let out = extract_file(registry(), "p", "README.md", b"# hello", &limits());
        assert_eq!(out.record.status, ParseStatus::Skipped);
        assert!(out.symbols.is_empty());
        assert!(out.record.reason.unwrap().contains("markdown"));
    }

    #[test]
    fn test_oversize_file_is_skipped() {
        let small = ExtractConfig { max_file_bytes: 4, ..limits() };
        let out = extract_file(registry(), "p", "a.py", b"x = 12345\n", &small);
        assert_eq!(out.record.status, ParseStatus::Skipped);
    }

    #[test]
    fn test_syntax_error_fails_without_symbols() {
        let out = extract_file(registry(), "p", "bad.py", b"def broken(:\n    pass\n", &limits());
        assert_eq!(out.record.status, ParseStatus::Failed);
        assert!(out.symbols.is_empty());
        assert!(out.record.reason.unwrap().starts_with("syntax error at line"));
    }

    #[test]
    fn test_lossy_utf8_is_partial() {
        let out = extract_file(registry(), "p", "a.py", b"x = 1\n# caf\xe9\ndef f():\n    pass\n", &limits());
        assert_eq!(out.record.status, ParseStatus::Partial);
        assert!(out.symbols.iter().any(|s| s.name == "f"));
    }

    #[test]
    fn test_symbol_ceiling_is_partial() {
        let source = "def a():\n    pass\n\ndef b():\n    pass\n\ndef c():\n    pass\n";
        let tight = ExtractConfig { max_symbols_per_file: 2, ..limits() };
        let out = extract_file(registry(), "p", "m.py", source.as_bytes(), &tight);
        assert_eq!(out.record.status, ParseStatus::Partial);
        assert_eq!(out.symbols.len(), 2);
        assert!(out.record.reason.unwrap().contains("symbol ceiling"));
    }

    #[test]
    fn test_content_hash_is_blake3() {
        let out = extract_file(registry(), "p", "a.py", b"x = 1\n", &limits());
        assert_eq!(out.record.content_hash, blake3::hash(b"x = 1\n").to_hex().to_string());
        assert_eq!(out.record.status, ParseStatus::Ok);
    }
}
