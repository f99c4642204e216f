//! Browsable file and symbol tree for a published version

use crate::graph::GraphVersion;
use crate::language::Language;
use crate::model::ParseStatus;
use crate::symbol::{Span, Symbol, SymbolKind};
use crate::uri::SymbolUri;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct SymbolNode {
    pub uri: SymbolUri,
    pub kind: SymbolKind,
    pub name: String,
    pub qualified_name: String,
    pub span: Span,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SymbolNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileNode {
    pub path: String,
    pub language: Language,
    pub status: ParseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub symbols: Vec<SymbolNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStructure {
    pub version: u64,
    pub fingerprint: String,
    pub files: Vec<FileNode>,
}

impl ProjectStructure {
    pub fn from_version(version: &GraphVersion) -> Self {
        let files = version
            .files
            .iter()
            .map(|record| FileNode {
                path: record.path.clone(),
                language: record.language,
                status: record.status,
                reason: record.reason.clone(),
                symbols: file_tree(version.graph.symbols_in_file(&record.path)),
            })
            .collect();
        Self { version: version.version, fingerprint: version.fingerprint.clone(), files }
    }

    pub fn symbol_count(&self) -> usize {
        fn count(nodes: &[SymbolNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        self.files.iter().map(|f| count(&f.symbols)).sum()
    }
}

/// Nest a file's symbols under their parents, in source order
fn file_tree(mut symbols: Vec<&Symbol>) -> Vec<SymbolNode> {
    symbols.sort_by(|a, b| {
        (a.span.start_line, a.span.start_col)
            .cmp(&(b.span.start_line, b.span.start_col))
            .then_with(|| a.uri.cmp(&b.uri))
    });

    let present: HashMap<&SymbolUri, usize> = symbols.iter().enumerate().map(|(i, s)| (&s.uri, i)).collect();
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (i, symbol) in symbols.iter().enumerate() {
        match symbol.parent.as_ref().and_then(|p| present.get(p)) {
            Some(&parent) if parent != i => children.entry(parent).or_default().push(i),
            _ => roots.push(i),
        }
    }

    fn node(i: usize, symbols: &[&Symbol], children: &HashMap<usize, Vec<usize>>) -> SymbolNode {
        let s = symbols[i];
        SymbolNode {
            uri: s.uri.clone(),
            kind: s.kind,
            name: s.name.clone(),
            qualified_name: s.qualified_name.clone(),
            span: s.span,
            signature: s.signature.clone(),
            children: children
                .get(&i)
                .map(|c| c.iter().map(|&j| node(j, symbols, children)).collect())
                .unwrap_or_default(),
        }
    }

    roots.into_iter().map(|i| node(i, &symbols, &children)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{extract_file, registry};
    use crate::config::ExtractConfig;
    use crate::graph::build_graph;
    use uuid::Uuid;

    #[test]
    fn test_methods_nest_under_classes() {
        let source = "class Greeter:\n    def greet(self):\n        pass\n\ndef main():\n    pass\n";
        let extraction = extract_file(registry(), "p", "app.py", source.as_bytes(), &ExtractConfig::default());
        let version = GraphVersion::new(Uuid::new_v4(), 1, Uuid::new_v4(), "h", build_graph(vec![extraction]));

        let structure = ProjectStructure::from_version(&version);
        assert_eq!(structure.files.len(), 1);
        let module = &structure.files[0].symbols[0];
        assert_eq!(module.kind, SymbolKind::Module);

        let names: Vec<&str> = module.children.iter().map(|c| c.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["Greeter", "main"]);
        assert_eq!(module.children[0].children[0].qualified_name, "Greeter.greet");
        assert_eq!(structure.symbol_count(), 4);
    }
}
