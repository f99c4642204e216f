//! Language Adapter Framework
//!
//! Each supported language provides a tree-sitter grammar and an adapter
//! that maps its syntax onto the five symbol kinds and raw references. The
//! graph builder never sees language-specific logic.

pub mod framework;
pub mod helpers;
pub mod python;
pub mod javascript;
pub mod rust;
pub mod go;

pub use framework::{
    AdapterRegistry, FileContext, FileExtraction, LanguageAdapter, NoopAdapter, ParseError, RawReference, SyntaxTree,
    default_registry, extract_file, extract_snapshot, registry,
};
