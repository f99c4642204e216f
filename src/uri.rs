//! Symbol URI - stable identity for every symbol in a graph version
//!
//! Format: `archintel://<project>/<path>#<kind>:<qualified>@<line>`
//!
//! Examples:
//! - `archintel://3f1c.../src/auth.py#function:validate_token@42`
//! - `archintel://3f1c.../lib/db.js#method:DatabaseClient.connect@10`

use crate::{Error, Result};
use crate::symbol::SymbolKind;
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

const SCHEME: &str = "archintel://";

/// Stable URI for a symbol.
///
/// The URI is the primary key for symbols and both ends of edges. Ordering
/// follows the field order, which gives a path-major order for sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolUri {
    /// Project identifier
    pub project: String,
    /// File path relative to the snapshot root, `/` separated
    pub path: String,
    /// Symbol kind
    pub kind: SymbolKind,
    /// Qualified name (`Container.member` for members)
    pub name: String,
    /// Line where the symbol starts (1-indexed)
    pub line: u32,
}

impl SymbolUri {
    pub fn new(project: impl Into<String>, path: impl Into<String>, kind: SymbolKind, name: impl Into<String>, line: u32) -> Self {
        Self {
            project: project.into(),
            path: path.into(),
            kind,
            name: name.into(),
            line,
        }
    }

    /// Parse a URI string into a SymbolUri
    ///
    /// The fragment starts at the first `#` followed by a well-formed
    /// `kind:name@line`, so paths may contain `#` and names may too
    /// (JavaScript private members).
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri.strip_prefix(SCHEME)
            .ok_or_else(|| Error::InvalidUri(format!("URI must start with {SCHEME}")))?;

        let (project_path, (kind, name, line)) = rest
            .match_indices('#')
            .find_map(|(at, _)| Self::parse_fragment(&rest[at + 1..]).map(|fragment| (&rest[..at], fragment)))
            .ok_or_else(|| Error::InvalidUri(format!("URI needs a #kind:name@line fragment: {uri}")))?;

        let (project, path) = project_path.split_once('/')
            .ok_or_else(|| Error::InvalidUri("URI must contain project/path".to_string()))?;

        if project.is_empty() || path.is_empty() {
            return Err(Error::InvalidUri(format!("URI has an empty component: {uri}")));
        }

        Ok(Self::new(project, path, kind, name, line))
    }

    fn parse_fragment(fragment: &str) -> Option<(SymbolKind, &str, u32)> {
        let (kind_name, line) = fragment.rsplit_once('@')?;
        let (kind, name) = kind_name.split_once(':')?;
        let kind = SymbolKind::from_str(kind).ok()?;
        let line = line.parse().ok()?;
        (!name.is_empty()).then_some((kind, name, line))
    }

    pub fn to_uri_string(&self) -> String {
        format!(
            "{SCHEME}{}/{}#{}:{}@{}",
            self.project, self.path, self.kind.as_str(), self.name, self.line
        )
    }

    /// Short name: the last segment of the qualified name
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for SymbolUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri_string())
    }
}

impl FromStr for SymbolUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for SymbolUri {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_uri_string())
    }
}

impl<'de> Deserialize<'de> for SymbolUri {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SymbolUri::parse(&s).map_err(serde::de::Error::custom)
    }
}
