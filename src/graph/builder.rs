//! Graph builder: per-file extractions → one resolved symbol graph

use super::SymbolGraph;
use crate::adapter::FileExtraction;
use crate::linker::{GlobalLinker, GlobalLinkerStats};
use crate::model::FileRecord;
use tracing::{debug, info};

/// What one build produced.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// File records in path order
    pub files: Vec<FileRecord>,
    pub graph: SymbolGraph,
    pub linker: GlobalLinkerStats,
}

/// Resolve every file's references against the whole snapshot.
///
/// Deterministic: files are taken in path order and the linker sorts its
/// output, so identical extractions give identical edge sets. Blocking.
pub fn build_graph(mut extractions: Vec<FileExtraction>) -> BuildOutput {
    extractions.sort_by(|a, b| a.record.path.cmp(&b.record.path));
    extractions.dedup_by(|a, b| a.record.path == b.record.path);

    let (edges, linker) = {
        let symbols = extractions.iter().flat_map(|e| e.symbols.iter());
        let references: Vec<_> = extractions.iter().flat_map(|e| e.references.iter().cloned()).collect();
        GlobalLinker::new(symbols).link(&references)
    };
    debug!(%linker, "references linked");

    let mut files = Vec::with_capacity(extractions.len());
    let mut symbols = Vec::new();
    for extraction in extractions {
        files.push(extraction.record);
        symbols.extend(extraction.symbols);
    }

    let graph = SymbolGraph::from_parts(symbols, edges);
    info!(
        files = files.len(),
        symbols = graph.symbol_count(),
        edges = graph.all_edges().len(),
        resolved = linker.resolved,
        "graph built"
    );
    BuildOutput { files, graph, linker }
}
