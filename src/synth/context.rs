//! Bounded context assembly
//!
//! Symbols in scope are ranked by degree (descending), then qualified name,
//! and rendered one block each until the character budget would be
//! exceeded. The same graph always yields the same context.

use crate::edge::EdgeKind;
use crate::graph::{GraphVersion, SymbolGraph};
use crate::model::{DocumentKind, DocumentTarget};
use crate::symbol::{Symbol, SymbolKind};
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisContext {
    pub target: DocumentTarget,
    pub text: String,
    pub included: usize,
    pub omitted: usize,
}

impl SynthesisContext {
    pub fn truncated(&self) -> bool {
        self.omitted > 0
    }

    pub fn is_empty(&self) -> bool {
        self.included == 0
    }
}

/// Symbols a target covers, unranked
pub fn symbols_in_scope<'g>(graph: &'g SymbolGraph, target: &DocumentTarget) -> Vec<&'g Symbol> {
    match target {
        DocumentTarget::File(path) => graph.symbols_in_file(path),
        DocumentTarget::Module(qualified) => {
            let paths: Vec<&str> = graph
                .all_symbols()
                .filter(|s| s.kind == SymbolKind::Module)
                .filter(|s| s.qualified_name == *qualified || s.qualified_name.starts_with(&format!("{qualified}.")))
                .map(|s| s.path.as_str())
                .collect();
            paths.into_iter().flat_map(|p| graph.symbols_in_file(p)).collect()
        }
        DocumentTarget::Project => graph.all_symbols().collect(),
    }
}

/// Degree descending, then qualified name, then URI
pub fn rank<'g>(graph: &SymbolGraph, mut symbols: Vec<&'g Symbol>) -> Vec<&'g Symbol> {
    symbols.sort_by(|a, b| {
        graph
            .degree(&b.uri)
            .cmp(&graph.degree(&a.uri))
            .then_with(|| a.qualified_name.cmp(&b.qualified_name))
            .then_with(|| a.uri.cmp(&b.uri))
    });
    symbols
}

/// One fact block for a symbol: header, doc line, resolved outgoing edges
pub fn render_symbol(graph: &SymbolGraph, symbol: &Symbol) -> String {
    let mut block = format!("- {} {}", symbol.kind, symbol.qualified_name);
    if let Some(sig) = &symbol.signature {
        let _ = write!(block, " {sig}");
    }
    let _ = writeln!(block, " ({}:{}-{})", symbol.path, symbol.span.start_line, symbol.span.end_line);

    if let Some(doc) = symbol.doc.as_deref().and_then(|d| d.lines().next()) {
        let _ = writeln!(block, "  doc: {doc}");
    }

    let mut targets: BTreeMap<EdgeKind, Vec<&str>> = BTreeMap::new();
    for edge in graph.edges_from(&symbol.uri) {
        if let Some(to) = edge.to_uri() {
            targets.entry(edge.kind).or_default().push(to.name.as_str());
        }
    }
    for (kind, mut names) in targets {
        names.dedup();
        let _ = writeln!(block, "  {kind}: {}", names.join(", "));
    }
    block
}

/// Assemble the context for one target within `budget` characters.
pub fn assemble(graph: &SymbolGraph, target: &DocumentTarget, budget: usize) -> SynthesisContext {
    let ranked = rank(graph, symbols_in_scope(graph, target));
    let total = ranked.len();

    let mut text = String::new();
    let mut used = 0;
    let mut included = 0;
    for symbol in ranked {
        let block = render_symbol(graph, symbol);
        let size = block.chars().count();
        if used + size > budget {
            break;
        }
        used += size;
        text.push_str(&block);
        included += 1;
    }

    SynthesisContext { target: target.clone(), text, included, omitted: total - included }
}

/// What a document's inputs hash to.
///
/// File and module documents follow the content hashes of the files they
/// cover; the project document follows the snapshot hash.
pub fn source_fingerprint(version: &GraphVersion, target: &DocumentTarget, kind: DocumentKind, budget: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(target.as_key().as_bytes());
    hasher.update(b"\0");
    hasher.update(budget.to_string().as_bytes());
    hasher.update(b"\0");

    match target {
        DocumentTarget::Project => {
            hasher.update(version.snapshot_hash.as_bytes());
        }
        _ => {
            let mut paths: Vec<&str> = symbols_in_scope(&version.graph, target).iter().map(|s| s.path.as_str()).collect();
            paths.sort_unstable();
            paths.dedup();
            for path in paths {
                let hash = version.file(path).map(|f| f.content_hash.as_str()).unwrap_or("");
                hasher.update(path.as_bytes());
                hasher.update(b"\0");
                hasher.update(hash.as_bytes());
                hasher.update(b"\n");
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}
