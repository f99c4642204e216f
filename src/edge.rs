//! Edge types
//!
//! Four relationship kinds come out of extraction:
//! - `Imports`: module → imported symbol or module
//! - `Calls`: symbol → callee
//! - `Inherits`: class → base class, trait or interface
//! - `References`: any other named use
//!
//! A reference that cannot be pinned to exactly one symbol is kept as an
//! unresolved edge carrying its raw name.

use crate::uri::SymbolUri;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Imports,
    Calls,
    Inherits,
    References,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Imports => "imports",
            EdgeKind::Calls => "calls",
            EdgeKind::Inherits => "inherits",
            EdgeKind::References => "references",
        }
    }

    pub fn all() -> &'static [EdgeKind] {
        &[EdgeKind::Imports, EdgeKind::Calls, EdgeKind::Inherits, EdgeKind::References]
    }
}

impl FromStr for EdgeKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "imports" | "import" => Ok(EdgeKind::Imports),
            "calls" | "call" => Ok(EdgeKind::Calls),
            "inherits" | "inherit" | "extends" => Ok(EdgeKind::Inherits),
            "references" | "reference" | "ref" => Ok(EdgeKind::References),
            _ => Err(crate::Error::Corrupt(format!("Unknown edge kind: {}", s))),
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which resolution tier matched a resolved edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    SameFile,
    SameDirectory,
    Global,
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionTier::SameFile => "same_file",
            ResolutionTier::SameDirectory => "same_directory",
            ResolutionTier::Global => "global",
        }
    }
}

impl FromStr for ResolutionTier {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "same_file" => Ok(ResolutionTier::SameFile),
            "same_directory" => Ok(ResolutionTier::SameDirectory),
            "global" => Ok(ResolutionTier::Global),
            _ => Err(crate::Error::Corrupt(format!("Unknown resolution tier: {}", s))),
        }
    }
}

/// Where an edge points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EdgeTarget {
    Resolved {
        uri: SymbolUri,
        tier: ResolutionTier,
    },
    /// `candidates` is non-empty when the miss was caused by ambiguity.
    Unresolved {
        candidates: Vec<SymbolUri>,
    },
}

/// A directed relationship from a symbol to a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from_uri: SymbolUri,
    pub kind: EdgeKind,
    /// Name as written at the reference site
    pub name: String,
    pub target: EdgeTarget,
    /// Line of the reference site (1-indexed)
    pub line: u32,
}

impl Edge {
    pub fn resolved(from_uri: SymbolUri, kind: EdgeKind, name: impl Into<String>, to_uri: SymbolUri, tier: ResolutionTier, line: u32) -> Self {
        Self {
            from_uri,
            kind,
            name: name.into(),
            target: EdgeTarget::Resolved { uri: to_uri, tier },
            line,
        }
    }

    pub fn unresolved(from_uri: SymbolUri, kind: EdgeKind, name: impl Into<String>, candidates: Vec<SymbolUri>, line: u32) -> Self {
        Self {
            from_uri,
            kind,
            name: name.into(),
            target: EdgeTarget::Unresolved { candidates },
            line,
        }
    }

    pub fn to_uri(&self) -> Option<&SymbolUri> {
        match &self.target {
            EdgeTarget::Resolved { uri, .. } => Some(uri),
            EdgeTarget::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.to_uri().is_some()
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(&self.target, EdgeTarget::Unresolved { candidates } if !candidates.is_empty())
    }

    /// Canonical single-line form. Versions are fingerprinted over these.
    pub fn canonical_line(&self) -> String {
        let target = match &self.target {
            EdgeTarget::Resolved { uri, tier } => format!("{} [{}]", uri, tier.as_str()),
            EdgeTarget::Unresolved { candidates } => {
                let names: Vec<String> = candidates.iter().map(|c| c.to_uri_string()).collect();
                format!("? {} [{}]", self.name, names.join(","))
            }
        };
        format!("{} -{}-> {} @{}", self.from_uri, self.kind, target, self.line)
    }

    /// Sort key shared by the builder and storage so edge order is stable
    pub fn sort_key(&self) -> (&SymbolUri, EdgeKind, &EdgeTarget, &str, u32) {
        (&self.from_uri, self.kind, &self.target, &self.name, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolKind;

    fn sample_uri(name: &str, line: u32) -> SymbolUri {
        SymbolUri::new("p", "src/main.py", SymbolKind::Function, name, line)
    }

    #[test]
    fn test_edge_kind_roundtrip() {
        for kind in EdgeKind::all() {
            let parsed: EdgeKind = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_resolved_edge() {
        let edge = Edge::resolved(sample_uri("caller", 1), EdgeKind::Calls, "callee", sample_uri("callee", 9), ResolutionTier::SameFile, 3);
        assert!(edge.is_resolved());
        assert!(!edge.is_ambiguous());
        assert_eq!(edge.to_uri().unwrap().name, "callee");
    }

    #[test]
    fn test_ambiguous_edge_is_unresolved() {
        let edge = Edge::unresolved(
            sample_uri("caller", 1),
            EdgeKind::Calls,
            "helper",
            vec![sample_uri("helper", 5), sample_uri("helper", 20)],
            3,
        );
        assert!(!edge.is_resolved());
        assert!(edge.is_ambiguous());
        assert!(edge.canonical_line().contains("? helper"));
    }
}
