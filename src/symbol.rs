//! Symbol types
//!
//! Every language maps onto five symbol kinds:
//! - `Module`: the file-level node, one per parsed file
//! - `Class`: class, struct, enum, trait, interface, named type
//! - `Function`: free function
//! - `Method`: function owned by a class-like container
//! - `Variable`: module-level variable or constant

use crate::{Error, Result};
use crate::uri::SymbolUri;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Module,
    Class,
    Function,
    Method,
    Variable,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Module => "module",
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Variable => "variable",
        }
    }

    pub fn all() -> &'static [SymbolKind] {
        &[
            SymbolKind::Module,
            SymbolKind::Class,
            SymbolKind::Function,
            SymbolKind::Method,
            SymbolKind::Variable,
        ]
    }

    /// Whether a call expression can target this kind (constructors count)
    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method | SymbolKind::Class)
    }
}

impl FromStr for SymbolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "module" | "file" | "package" => Ok(SymbolKind::Module),
            "class" | "struct" | "enum" | "trait" | "interface" | "type" => Ok(SymbolKind::Class),
            "function" | "fn" | "def" => Ok(SymbolKind::Function),
            "method" => Ok(SymbolKind::Method),
            "variable" | "var" | "const" | "static" => Ok(SymbolKind::Variable),
            _ => Err(Error::InvalidUri(format!("Unknown symbol kind: {}", s))),
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source location of a symbol. Lines are 1-indexed, columns 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self { start_line, start_col, end_line, end_col }
    }

    /// Whether the position falls inside this span (inclusive on both ends)
    pub fn contains(&self, line: u32, col: u32) -> bool {
        let after_start = (line, col) >= (self.start_line, self.start_col);
        let before_end = (line, col) <= (self.end_line, self.end_col);
        after_start && before_end
    }

    /// Rough size used to pick the innermost of nested spans
    pub fn extent(&self) -> (u32, u32) {
        let lines = self.end_line.saturating_sub(self.start_line);
        let cols = if lines == 0 { self.end_col.saturating_sub(self.start_col) } else { self.end_col };
        (lines, cols)
    }
}

/// A symbol in the code graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub uri: SymbolUri,
    pub kind: SymbolKind,
    /// Identifier as written
    pub name: String,
    /// Name including enclosing containers, e.g. `Greeter.greet`
    pub qualified_name: String,
    /// File path relative to the snapshot root
    pub path: String,
    pub span: Span,
    /// Parameter list and return type for callables, base list for classes
    pub signature: Option<String>,
    /// Docstring, JSDoc, `///` or leading comment block
    pub doc: Option<String>,
    /// Enclosing symbol (module symbol for top-level declarations)
    pub parent: Option<SymbolUri>,
}

impl Symbol {
    pub fn new(
        project: impl Into<String>,
        path: impl Into<String>,
        kind: SymbolKind,
        qualified_name: impl Into<String>,
        span: Span,
    ) -> Self {
        let project = project.into();
        let path = path.into();
        let qualified_name = qualified_name.into();
        let name = qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&qualified_name)
            .to_string();

        let uri = SymbolUri::new(&project, &path, kind, &qualified_name, span.start_line);

        Self {
            uri,
            kind,
            name,
            qualified_name,
            path,
            span,
            signature: None,
            doc: None,
            parent: None,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        let doc = doc.into();
        if !doc.trim().is_empty() {
            self.doc = Some(doc);
        }
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_parent(mut self, parent: SymbolUri) -> Self {
        self.parent = Some(parent);
        self
    }

    /// One-line description used in synthesis contexts and citations
    pub fn short_description(&self) -> String {
        match &self.signature {
            Some(sig) => format!("{} {} {}", self.kind, self.qualified_name, sig),
            None => format!("{} {}", self.kind, self.qualified_name),
        }
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
    }
}
