//! Symbol index for reference resolution
//!
//! Built once per graph build over every symbol of the snapshot.

use crate::symbol::Symbol;
use std::collections::HashMap;

pub struct SymbolIndex<'a> {
    symbols: Vec<&'a Symbol>,
    /// short name → symbol positions
    by_name: HashMap<&'a str, Vec<usize>>,
    /// qualified name → symbol positions
    by_qualified: HashMap<&'a str, Vec<usize>>,
    /// file path → dotted module path of that file
    module_of_path: HashMap<&'a str, &'a str>,
}

impl<'a> SymbolIndex<'a> {
    pub fn build(symbols: impl IntoIterator<Item = &'a Symbol>) -> Self {
        let mut index = Self {
            symbols: Vec::new(),
            by_name: HashMap::new(),
            by_qualified: HashMap::new(),
            module_of_path: HashMap::new(),
        };

        for symbol in symbols {
            let pos = index.symbols.len();
            index.by_name.entry(symbol.name.as_str()).or_default().push(pos);
            index.by_qualified.entry(symbol.qualified_name.as_str()).or_default().push(pos);
            if symbol.kind == crate::symbol::SymbolKind::Module {
                index.module_of_path.insert(symbol.path.as_str(), symbol.qualified_name.as_str());
            }
            index.symbols.push(symbol);
        }
        index
    }

    fn collect(&self, positions: Option<&Vec<usize>>) -> Vec<&'a Symbol> {
        positions
            .map(|ps| ps.iter().map(|&p| self.symbols[p]).collect())
            .unwrap_or_default()
    }

    pub fn by_qualified(&self, qualified: &str) -> Vec<&'a Symbol> {
        self.collect(self.by_qualified.get(qualified))
    }

    pub fn by_name(&self, name: &str) -> Vec<&'a Symbol> {
        self.collect(self.by_name.get(name))
    }

    pub fn module_of(&self, path: &str) -> Option<&'a str> {
        self.module_of_path.get(path).copied()
    }
}
