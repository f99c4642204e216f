//! Language detection by file extension

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Languages recognised in a snapshot. Only some have an extractor; the rest
/// are recorded with status `skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Rust,
    Go,
    TypeScript,
    Java,
    C,
    Cpp,
    Ruby,
    Php,
    Markdown,
    Yaml,
    Json,
    Toml,
    Unknown,
}

impl Language {
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "py" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "rs" => Language::Rust,
            "go" => Language::Go,
            "ts" | "tsx" => Language::TypeScript,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cc" | "cpp" | "cxx" | "hpp" => Language::Cpp,
            "rb" => Language::Ruby,
            "php" => Language::Php,
            "md" | "markdown" => Language::Markdown,
            "yml" | "yaml" => Language::Yaml,
            "json" => Language::Json,
            "toml" => Language::Toml,
            _ => Language::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Markdown => "markdown",
            Language::Yaml => "yaml",
            Language::Json => "json",
            Language::Toml => "toml",
            Language::Unknown => "unknown",
        }
    }

    /// File suffixes stripped when deriving a module path
    pub fn known_extensions() -> &'static [&'static str] {
        &[
            "py", "pyi", "js", "jsx", "mjs", "cjs", "rs", "go", "ts", "tsx", "java", "c", "h",
            "cc", "cpp", "cxx", "hpp", "rb", "php",
        ]
    }
}

impl FromStr for Language {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Language::Python),
            "javascript" => Ok(Language::JavaScript),
            "rust" => Ok(Language::Rust),
            "go" => Ok(Language::Go),
            "typescript" => Ok(Language::TypeScript),
            "java" => Ok(Language::Java),
            "c" => Ok(Language::C),
            "cpp" => Ok(Language::Cpp),
            "ruby" => Ok(Language::Ruby),
            "php" => Ok(Language::Php),
            "markdown" => Ok(Language::Markdown),
            "yaml" => Ok(Language::Yaml),
            "json" => Ok(Language::Json),
            "toml" => Ok(Language::Toml),
            "unknown" => Ok(Language::Unknown),
            _ => Err(crate::Error::Corrupt(format!("Unknown language: {}", s))),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Dotted module path for a file, e.g. `pkg/util.py` → `pkg.util`.
///
/// Package entry files (`__init__.py`, `index.js`, `mod.rs`) collapse onto
/// their directory; a root-level entry file becomes `crate`.
pub fn module_path(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(last) = segments.pop() {
        let stem = match last.rsplit_once('.') {
            Some((stem, ext)) if Language::known_extensions().contains(&ext) => stem,
            _ => last,
        };
        if !matches!(stem, "__init__" | "index" | "mod") {
            segments.push(stem);
        }
    }
    if segments.is_empty() {
        return "crate".to_string();
    }
    segments.join(".")
}
