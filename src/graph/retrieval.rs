//! Lexical retrieval over a symbol graph
//!
//! Shared by the synthesizer and the oracle: question terms are matched
//! against symbol names, signatures and doc comments, and the best matches
//! are expanded one hop along resolved edges.

use super::SymbolGraph;
use crate::edge::Edge;
use crate::symbol::Symbol;
use std::collections::{BTreeSet, HashSet};

const NAME_WEIGHT: f64 = 3.0;
const SIGNATURE_WEIGHT: f64 = 1.5;
const DOC_WEIGHT: f64 = 1.0;

const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how", "i", "in",
    "is", "it", "its", "me", "my", "of", "on", "or", "the", "this", "that", "there", "to", "was", "we", "what",
    "when", "where", "which", "who", "why", "with", "you",
];

/// Split camelCase and PascalCase, keeping acronyms together (`HTTPServer` → `http`, `server`)
fn split_camel(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        let boundary = i > 0 && c.is_uppercase() && {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower)
        };
        if boundary && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Tokenise free text or identifiers into lowercase search terms.
///
/// Splits on anything that is not alphanumeric (so `_` and `.` separate),
/// then on case changes. Stop words and single characters are dropped.
/// Order of first occurrence is kept, duplicates removed.
pub fn terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .flat_map(split_camel)
        .filter(|t| t.chars().count() > 1 && !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Weighted overlap between query terms and one symbol.
///
/// Each query term counts once, at the weight of the strongest field it
/// appears in.
pub fn score_symbol(symbol: &Symbol, query: &[String]) -> f64 {
    let name: HashSet<String> = terms(&symbol.qualified_name).into_iter().collect();
    let signature: HashSet<String> = symbol.signature.as_deref().map(terms).unwrap_or_default().into_iter().collect();
    let doc: HashSet<String> = symbol.doc.as_deref().map(terms).unwrap_or_default().into_iter().collect();

    query
        .iter()
        .map(|t| {
            if name.contains(t) {
                NAME_WEIGHT
            } else if signature.contains(t) {
                SIGNATURE_WEIGHT
            } else if doc.contains(t) {
                DOC_WEIGHT
            } else {
                0.0
            }
        })
        .sum()
}

#[derive(Debug, Clone, Copy)]
pub struct ScoredSymbol<'g> {
    pub symbol: &'g Symbol,
    pub score: f64,
}

/// Symbols scoring at or above `threshold`, best first, ties by URI, at most `limit`.
pub fn search<'g>(graph: &'g SymbolGraph, query: &[String], threshold: f64, limit: usize) -> Vec<ScoredSymbol<'g>> {
    if query.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<ScoredSymbol<'g>> = graph
        .all_symbols()
        .map(|symbol| ScoredSymbol { symbol, score: score_symbol(symbol, query) })
        .filter(|s| s.score > 0.0 && s.score >= threshold)
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.symbol.uri.cmp(&b.symbol.uri)));
    scored.truncate(limit);
    scored
}

/// Matches plus their one-hop neighbourhood.
#[derive(Debug, Clone)]
pub struct Subgraph<'g> {
    pub matches: Vec<ScoredSymbol<'g>>,
    /// Matches first, then neighbours; no duplicates
    pub symbols: Vec<&'g Symbol>,
    /// Resolved edges with both ends inside `symbols`
    pub edges: Vec<&'g Edge>,
}

impl<'g> Subgraph<'g> {
    /// Expand matches along resolved edges, stopping at `cap` symbols.
    pub fn expand(graph: &'g SymbolGraph, matches: Vec<ScoredSymbol<'g>>, cap: usize) -> Self {
        let mut symbols: Vec<&'g Symbol> = Vec::new();
        let mut included = HashSet::new();

        for m in matches.iter().take(cap) {
            if included.insert(&m.symbol.uri) {
                symbols.push(m.symbol);
            }
        }
        'expand: for m in &matches {
            for neighbour in graph.neighbours(&m.symbol.uri) {
                if symbols.len() >= cap {
                    break 'expand;
                }
                if included.insert(&neighbour.uri) {
                    symbols.push(neighbour);
                }
            }
        }

        let edges = symbols
            .iter()
            .flat_map(|s| graph.edges_from(&s.uri))
            .filter(|e| e.to_uri().is_some_and(|to| included.contains(to)))
            .collect();

        Self { matches, symbols, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// blake3 over the sorted symbol URIs and edge lines
    pub fn fingerprint(&self) -> String {
        let uris: BTreeSet<String> = self.symbols.iter().map(|s| s.uri.to_uri_string()).collect();
        let edges: BTreeSet<String> = self.edges.iter().map(|e| e.canonical_line()).collect();

        let mut hasher = blake3::Hasher::new();
        for line in uris.iter().chain(&edges) {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}
