//! Global reference linker
//!
//! Turns raw references into edges. Resolution order:
//! 1. Same file
//! 2. Same directory / package
//! 3. Unique match anywhere in the snapshot
//! 4. Unresolved
//!
//! A reference carrying an import hint only considers candidates declared in
//! the imported module, unless that module declares none of them. The first
//! tier holding any candidate then decides; if more than one is left the
//! reference stays unresolved and records them.

use super::index::SymbolIndex;
use crate::adapter::RawReference;
use crate::edge::{Edge, EdgeKind, ResolutionTier};
use crate::symbol::{Symbol, SymbolKind};
use crate::uri::SymbolUri;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct GlobalLinkerStats {
    pub total: usize,
    pub resolved: usize,
    pub ambiguous: usize,
    pub unresolved: usize,
    pub same_file: usize,
    pub same_directory: usize,
    pub global: usize,
}

impl fmt::Display for GlobalLinkerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Linker Stats:")?;
        writeln!(f, "  Total References: {}", self.total)?;
        writeln!(
            f,
            "  Resolved: {} (same file {}, same directory {}, global {})",
            self.resolved, self.same_file, self.same_directory, self.global
        )?;
        writeln!(f, "  Ambiguous: {}", self.ambiguous)?;
        writeln!(f, "  Unresolved: {}", self.unresolved)
    }
}

/// What a file-local name was imported as.
#[derive(Debug, Clone)]
struct ImportBinding {
    name: String,
    module: Option<String>,
}

/// Local name → binding, one table per file
type ImportTable = HashMap<String, ImportBinding>;

const SELF_RECEIVERS: &[&str] = &["self", "this", "cls", "Self"];

pub struct GlobalLinker<'a> {
    index: SymbolIndex<'a>,
}

impl<'a> GlobalLinker<'a> {
    pub fn new(symbols: impl IntoIterator<Item = &'a Symbol>) -> Self {
        Self { index: SymbolIndex::build(symbols) }
    }

    /// Resolve every reference. Output is sorted and deduplicated.
    pub fn link(&self, references: &[RawReference]) -> (Vec<Edge>, GlobalLinkerStats) {
        let tables = Self::import_tables(references);
        let empty = ImportTable::new();
        let mut stats = GlobalLinkerStats { total: references.len(), ..Default::default() };

        let mut edges: Vec<Edge> = references
            .iter()
            .map(|r| {
                let imports = tables.get(r.from.path.as_str()).unwrap_or(&empty);
                let edge = self.resolve(r, imports);
                match &edge.target {
                    crate::edge::EdgeTarget::Resolved { tier, .. } => {
                        stats.resolved += 1;
                        match tier {
                            ResolutionTier::SameFile => stats.same_file += 1,
                            ResolutionTier::SameDirectory => stats.same_directory += 1,
                            ResolutionTier::Global => stats.global += 1,
                        }
                    }
                    _ if edge.is_ambiguous() => stats.ambiguous += 1,
                    _ => stats.unresolved += 1,
                }
                edge
            })
            .collect();

        edges.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        edges.dedup_by(|a, b| a.from_uri == b.from_uri && a.kind == b.kind && a.target == b.target && a.name == b.name);
        (edges, stats)
    }

    fn import_tables(references: &[RawReference]) -> HashMap<&str, ImportTable> {
        let mut tables: HashMap<&str, ImportTable> = HashMap::new();
        for r in references.iter().filter(|r| r.kind == EdgeKind::Imports) {
            let local = r.alias.clone().unwrap_or_else(|| r.name.clone());
            tables.entry(r.from.path.as_str()).or_default().insert(
                local,
                ImportBinding { name: r.name.clone(), module: r.module.clone() },
            );
        }
        tables
    }

    fn accepts(kind: EdgeKind, candidate: &Symbol) -> bool {
        match kind {
            EdgeKind::Calls => candidate.kind.is_callable(),
            EdgeKind::Inherits => candidate.kind == SymbolKind::Class,
            EdgeKind::Imports => true,
            EdgeKind::References => candidate.kind != SymbolKind::Module,
        }
    }

    fn module_matches(module: &str, hint: &str) -> bool {
        module == hint || module.ends_with(&format!(".{hint}"))
    }

    /// Candidates declared in the module an import names
    fn in_module(&self, candidates: &[&'a Symbol], hint: &str) -> Vec<&'a Symbol> {
        candidates
            .iter()
            .copied()
            .filter(|c| self.index.module_of(&c.path).is_some_and(|m| Self::module_matches(m, hint)))
            .collect()
    }

    fn dir(path: &str) -> &str {
        path.rsplit_once('/').map(|(d, _)| d).unwrap_or("")
    }

    fn resolve(&self, r: &RawReference, imports: &ImportTable) -> Edge {
        let mut name = r.name.clone();
        let mut receiver = r.receiver.clone();
        let mut hint = r.module.clone();

        // Calls through an imported name or module alias take the import's hint
        if r.kind != EdgeKind::Imports {
            match &receiver {
                None => {
                    if let Some(binding) = imports.get(&name) {
                        name = binding.name.clone();
                        hint = binding.module.clone();
                    }
                }
                Some(recv) => {
                    if let Some(binding) = imports.get(recv) {
                        hint = match &binding.module {
                            Some(m) if binding.name == *m || m.ends_with(&format!(".{}", binding.name)) => Some(m.clone()),
                            Some(m) => Some(format!("{m}.{}", binding.name)),
                            None => Some(binding.name.clone()),
                        };
                        receiver = None;
                    }
                }
            }
        }

        let candidates = self.candidates(r, &name, receiver.as_deref(), hint.as_deref());
        let candidates = match hint.as_deref() {
            Some(hint) => {
                let in_module = self.in_module(&candidates, hint);
                if in_module.is_empty() { candidates } else { in_module }
            }
            None => candidates,
        };
        let from_path = r.from.path.as_str();
        let from_dir = Self::dir(from_path);

        let tiers: [(ResolutionTier, Box<dyn Fn(&Symbol) -> bool>); 3] = [
            (ResolutionTier::SameFile, Box::new(|c: &Symbol| c.path == from_path)),
            (ResolutionTier::SameDirectory, Box::new(|c: &Symbol| Self::dir(&c.path) == from_dir)),
            (ResolutionTier::Global, Box::new(|_: &Symbol| true)),
        ];

        for (tier, in_tier) in tiers.iter() {
            let set: Vec<&Symbol> = candidates.iter().copied().filter(|c| in_tier(*c)).collect();
            if set.is_empty() {
                continue;
            }
            if let [only] = set.as_slice() {
                return Edge::resolved(r.from.clone(), r.kind, &r.name, only.uri.clone(), *tier, r.line);
            }

            let mut uris: Vec<SymbolUri> = set.iter().map(|c| c.uri.clone()).collect();
            uris.sort();
            debug!(name = %r.name, from = %r.from, candidates = uris.len(), "ambiguous reference");
            return Edge::unresolved(r.from.clone(), r.kind, &r.name, uris, r.line);
        }

        Edge::unresolved(r.from.clone(), r.kind, &r.name, Vec::new(), r.line)
    }

    /// Qualified-name matches first, short-name matches otherwise. Sorted by URI.
    fn candidates(&self, r: &RawReference, name: &str, receiver: Option<&str>, hint: Option<&str>) -> Vec<&'a Symbol> {
        let mut keys: Vec<String> = Vec::new();
        match receiver {
            Some(recv) if SELF_RECEIVERS.contains(&recv) => {
                if let Some((owner, _)) = r.from.name.rsplit_once('.') {
                    keys.push(format!("{owner}.{name}"));
                }
            }
            Some(recv) => {
                let owner = recv.rsplit(['.', ':']).next().unwrap_or(recv);
                keys.push(format!("{owner}.{name}"));
            }
            None => keys.push(name.to_string()),
        }
        if r.kind == EdgeKind::Imports {
            if let Some(module) = hint {
                if module != name {
                    keys.push(format!("{module}.{name}"));
                }
            }
        }

        let accept = |c: &&Symbol| Self::accepts(r.kind, c) && !(r.kind != EdgeKind::Calls && c.uri == r.from);

        let mut found: Vec<&'a Symbol> = keys
            .iter()
            .flat_map(|k| self.index.by_qualified(k))
            .filter(accept)
            .collect();

        if found.is_empty() {
            let short = name.rsplit('.').next().unwrap_or(name);
            found = self.index.by_name(short).into_iter().filter(accept).collect();
        }

        found.sort_by(|a, b| a.uri.cmp(&b.uri));
        found.dedup_by(|a, b| a.uri == b.uri);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeTarget;
    use crate::symbol::Span;

    fn sym(path: &str, kind: SymbolKind, qualified: &str, line: u32) -> Symbol {
        Symbol::new("p", path, kind, qualified, Span::new(line, 0, line + 2, 0))
    }

    fn module(path: &str) -> Symbol {
        sym(path, SymbolKind::Module, &crate::language::module_path(path), 1)
    }

    fn reference(from: &Symbol, kind: EdgeKind, name: &str) -> RawReference {
        RawReference::new(from.uri.clone(), kind, name, from.span.start_line)
    }

    fn tier_of(edge: &Edge) -> Option<ResolutionTier> {
        match &edge.target {
            EdgeTarget::Resolved { tier, .. } => Some(*tier),
            EdgeTarget::Unresolved { .. } => None,
        }
    }

    #[test]
    fn test_from_import_resolves_in_same_directory() {
        let a = module("a.py");
        let f = sym("a.py", SymbolKind::Function, "f", 1);
        let b = module("b.py");
        let symbols = vec![a, f.clone(), b.clone()];

        let linker = GlobalLinker::new(&symbols);
        let (edges, stats) = linker.link(&[reference(&b, EdgeKind::Imports, "f").with_module("a")]);

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from_uri, b.uri);
        assert_eq!(edges[0].to_uri(), Some(&f.uri));
        assert_eq!(tier_of(&edges[0]), Some(ResolutionTier::SameDirectory));
        assert_eq!(stats.same_directory, 1);
    }

    #[test]
    fn test_same_file_wins_over_global() {
        let main = sym("src/main.py", SymbolKind::Function, "main", 1);
        let local = sym("src/main.py", SymbolKind::Function, "helper", 10);
        let other = sym("lib/util.py", SymbolKind::Function, "helper", 1);
        let symbols = vec![main.clone(), local.clone(), other];

        let linker = GlobalLinker::new(&symbols);
        let edge = linker.resolve(&reference(&main, EdgeKind::Calls, "helper"), &ImportTable::new());
        assert_eq!(edge.to_uri(), Some(&local.uri));
        assert_eq!(tier_of(&edge), Some(ResolutionTier::SameFile));
    }

    #[test]
    fn test_unique_global_match() {
        let caller = sym("app/run.py", SymbolKind::Function, "run", 1);
        let target = sym("lib/util.py", SymbolKind::Function, "helper", 1);
        let symbols = vec![caller.clone(), target.clone()];

        let linker = GlobalLinker::new(&symbols);
        let edge = linker.resolve(&reference(&caller, EdgeKind::Calls, "helper"), &ImportTable::new());
        assert_eq!(tier_of(&edge), Some(ResolutionTier::Global));
    }

    #[test]
    fn test_ambiguity_is_recorded_not_picked() {
        let caller = sym("app/run.py", SymbolKind::Function, "run", 1);
        let one = sym("lib/one.py", SymbolKind::Function, "helper", 1);
        let two = sym("lib/two.py", SymbolKind::Function, "helper", 1);
        let symbols = vec![caller.clone(), one.clone(), two.clone()];

        let linker = GlobalLinker::new(&symbols);
        let (edges, stats) = linker.link(&[reference(&caller, EdgeKind::Calls, "helper")]);
        assert!(edges[0].is_ambiguous());
        assert_eq!(edges[0].target, EdgeTarget::Unresolved { candidates: vec![one.uri.clone(), two.uri.clone()] });
        assert_eq!(stats.ambiguous, 1);
    }

    #[test]
    fn test_import_hint_narrows_ambiguity() {
        let run_mod = module("app/run.py");
        let caller = sym("app/run.py", SymbolKind::Function, "run", 3);
        let one_mod = module("lib/one.py");
        let one = sym("lib/one.py", SymbolKind::Function, "helper", 1);
        let two_mod = module("lib/two.py");
        let two = sym("lib/two.py", SymbolKind::Function, "helper", 1);
        let symbols = vec![run_mod.clone(), caller.clone(), one_mod, one, two_mod, two.clone()];

        let refs = vec![
            reference(&run_mod, EdgeKind::Imports, "helper").with_module("lib.two"),
            reference(&caller, EdgeKind::Calls, "helper"),
        ];
        let linker = GlobalLinker::new(&symbols);
        let (edges, _) = linker.link(&refs);

        assert!(edges.iter().all(|e| e.to_uri() == Some(&two.uri)));
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn test_explicit_import_beats_same_directory_decoy() {
        let run_mod = module("app/run.py");
        let caller = sym("app/run.py", SymbolKind::Function, "run", 3);
        let decoy_mod = module("app/other.py");
        let decoy = sym("app/other.py", SymbolKind::Function, "helper", 1);
        let util_mod = module("lib/util.py");
        let helper = sym("lib/util.py", SymbolKind::Function, "helper", 1);
        let symbols = vec![run_mod.clone(), caller.clone(), decoy_mod, decoy, util_mod, helper.clone()];

        let refs = vec![
            reference(&run_mod, EdgeKind::Imports, "helper").with_module("lib.util"),
            reference(&caller, EdgeKind::Calls, "helper"),
        ];
        let linker = GlobalLinker::new(&symbols);
        let (edges, _) = linker.link(&refs);

        assert_eq!(edges.len(), 2);
        for edge in &edges {
            assert_eq!(edge.to_uri(), Some(&helper.uri));
            assert_eq!(tier_of(edge), Some(ResolutionTier::Global));
        }
    }

    #[test]
    fn test_import_of_unknown_module_falls_back_to_tiers() {
        let run_mod = module("app/run.py");
        let local_mod = module("app/other.py");
        let local = sym("app/other.py", SymbolKind::Function, "helper", 1);
        let symbols = vec![run_mod.clone(), local_mod, local.clone()];

        let linker = GlobalLinker::new(&symbols);
        let r = reference(&run_mod, EdgeKind::Imports, "helper").with_module("vendored.helpers");
        let edge = linker.resolve(&r, &ImportTable::new());
        assert_eq!(edge.to_uri(), Some(&local.uri));
        assert_eq!(tier_of(&edge), Some(ResolutionTier::SameDirectory));
    }

    #[test]
    fn test_self_receiver_targets_own_class() {
        let greet = sym("g.py", SymbolKind::Method, "Greeter.greet", 3);
        let prefix = sym("g.py", SymbolKind::Method, "Greeter.prefix", 6);
        let other = sym("g.py", SymbolKind::Method, "Other.prefix", 12);
        let symbols = vec![greet.clone(), prefix.clone(), other];

        let linker = GlobalLinker::new(&symbols);
        let r = reference(&greet, EdgeKind::Calls, "prefix").with_receiver("self");
        let edge = linker.resolve(&r, &ImportTable::new());
        assert_eq!(edge.to_uri(), Some(&prefix.uri));
    }

    #[test]
    fn test_unknown_name_is_unresolved_not_error() {
        let caller = sym("a.py", SymbolKind::Function, "main", 1);
        let symbols = vec![caller.clone()];
        let linker = GlobalLinker::new(&symbols);
        let (edges, stats) = linker.link(&[reference(&caller, EdgeKind::Calls, "print")]);
        assert!(!edges[0].is_resolved());
        assert!(!edges[0].is_ambiguous());
        assert_eq!(stats.unresolved, 1);
    }

    #[test]
    fn test_duplicate_references_collapse() {
        let caller = sym("a.py", SymbolKind::Function, "main", 1);
        let target = sym("a.py", SymbolKind::Function, "helper", 10);
        let symbols = vec![caller.clone(), target];
        let first = RawReference::new(caller.uri.clone(), EdgeKind::Calls, "helper", 4);
        let second = RawReference::new(caller.uri.clone(), EdgeKind::Calls, "helper", 2);

        let linker = GlobalLinker::new(&symbols);
        let (edges, _) = linker.link(&[first, second]);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].line, 2);
    }
}
