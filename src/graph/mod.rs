//! Symbol Graph - In-memory representation of one graph version
//!
//! Built once by the graph builder and never mutated afterwards. Readers
//! share it behind an `Arc` so the orchestrator can swap versions without
//! blocking queries.

pub mod builder;
pub mod retrieval;
pub mod version;

pub use builder::{BuildOutput, build_graph};
pub use retrieval::{ScoredSymbol, Subgraph, score_symbol, search, terms};
pub use version::{GraphVersion, VersionDiff, diff_versions};

use crate::edge::Edge;
use crate::symbol::Symbol;
use crate::uri::SymbolUri;
use std::collections::{BTreeMap, HashMap};

/// Immutable symbol graph for a single version.
///
/// Symbols are kept in URI order and edges in their canonical sort order, so
/// iteration is deterministic for identical inputs.
#[derive(Debug, Default, Clone)]
pub struct SymbolGraph {
    symbols: BTreeMap<SymbolUri, Symbol>,
    edges: Vec<Edge>,
    /// Outgoing edge positions per symbol
    edges_from: HashMap<SymbolUri, Vec<usize>>,
    /// Incoming resolved edge positions per symbol
    edges_to: HashMap<SymbolUri, Vec<usize>>,
    /// Symbols indexed by file path
    symbols_by_path: BTreeMap<String, Vec<SymbolUri>>,
}

impl SymbolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a graph from symbols and already sorted edges
    pub fn from_parts(symbols: impl IntoIterator<Item = Symbol>, mut edges: Vec<Edge>) -> Self {
        let mut graph = Self::new();
        for symbol in symbols {
            graph.symbols_by_path.entry(symbol.path.clone()).or_default().push(symbol.uri.clone());
            graph.symbols.insert(symbol.uri.clone(), symbol);
        }
        for uris in graph.symbols_by_path.values_mut() {
            uris.sort();
        }

        edges.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        for (pos, edge) in edges.iter().enumerate() {
            graph.edges_from.entry(edge.from_uri.clone()).or_default().push(pos);
            if let Some(to) = edge.to_uri() {
                graph.edges_to.entry(to.clone()).or_default().push(pos);
            }
        }
        graph.edges = edges;
        graph
    }

    pub fn get_symbol(&self, uri: &SymbolUri) -> Option<&Symbol> {
        self.symbols.get(uri)
    }

    /// Get all symbols in a file, in URI order
    pub fn symbols_in_file(&self, path: &str) -> Vec<&Symbol> {
        self.symbols_by_path
            .get(path)
            .map(|uris| uris.iter().filter_map(|uri| self.symbols.get(uri)).collect())
            .unwrap_or_default()
    }

    pub fn edges_from(&self, uri: &SymbolUri) -> Vec<&Edge> {
        self.positions(self.edges_from.get(uri))
    }

    /// Resolved edges pointing at a symbol
    pub fn edges_to(&self, uri: &SymbolUri) -> Vec<&Edge> {
        self.positions(self.edges_to.get(uri))
    }

    fn positions(&self, positions: Option<&Vec<usize>>) -> Vec<&Edge> {
        positions
            .map(|ps| ps.iter().map(|&p| &self.edges[p]).collect())
            .unwrap_or_default()
    }

    /// Number of resolved edges touching a symbol
    pub fn degree(&self, uri: &SymbolUri) -> usize {
        let outgoing = self.edges_from(uri).iter().filter(|e| e.is_resolved()).count();
        outgoing + self.edges_to.get(uri).map(|v| v.len()).unwrap_or(0)
    }

    /// Resolved one-hop neighbours in either direction
    pub fn neighbours(&self, uri: &SymbolUri) -> Vec<&Symbol> {
        let outgoing = self.edges_from(uri).into_iter().filter_map(|e| e.to_uri());
        let incoming = self.edges_to(uri).into_iter().map(|e| &e.from_uri);
        let mut found: Vec<&Symbol> = outgoing.chain(incoming).filter_map(|u| self.get_symbol(u)).collect();
        found.sort_by(|a, b| a.uri.cmp(&b.uri));
        found.dedup_by(|a, b| a.uri == b.uri);
        found
    }

    pub fn stats(&self) -> GraphStats {
        let resolved_edges = self.edges.iter().filter(|e| e.is_resolved()).count();
        let ambiguous_edges = self.edges.iter().filter(|e| e.is_ambiguous()).count();

        GraphStats {
            files: self.symbols_by_path.len(),
            total_symbols: self.symbols.len(),
            total_edges: self.edges.len(),
            resolved_edges,
            ambiguous_edges,
            unresolved_edges: self.edges.len() - resolved_edges,
        }
    }

    /// All symbols in URI order
    pub fn all_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    /// All edges in canonical order
    pub fn all_edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

/// Statistics about a symbol graph
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GraphStats {
    pub files: usize,
    pub total_symbols: usize,
    pub total_edges: usize,
    pub resolved_edges: usize,
    pub ambiguous_edges: usize,
    pub unresolved_edges: usize,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Symbol Graph Statistics:")?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(f, "  Symbols: {}", self.total_symbols)?;
        writeln!(
            f,
            "  Edges: {} (resolved: {}, unresolved: {}, ambiguous: {})",
            self.total_edges, self.resolved_edges, self.unresolved_edges, self.ambiguous_edges
        )
    }
}
