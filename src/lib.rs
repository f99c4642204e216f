//! # archintel - Repository architecture intelligence
//!
//! Ingests a remote repository, builds a structural graph of its files,
//! symbols and relationships, and answers questions or writes documentation
//! grounded in that graph.
//!
//! archintel provides:
//! - A repository fetcher that validates locations and produces immutable snapshots
//! - Tree-sitter based symbol extraction with per-language adapters
//! - A deterministic graph builder with tiered reference resolution
//! - A per-project pipeline orchestrator with atomic version publication
//! - A documentation synthesizer and a query oracle over a language-model provider
//! - SQLite-backed storage of versions, documents and query records

pub mod error;
pub mod uri;
pub mod symbol;
pub mod edge;
pub mod language;
pub mod model;
pub mod config;
pub mod adapter;
pub mod linker;
pub mod graph;
pub mod fetch;
pub mod provider;
pub mod synth;
pub mod query;
pub mod storage;
pub mod pipeline;
pub mod server;

// Re-exports for convenient access
pub use error::{Error, FetchError, PipelineError, ProviderError, Result, ValidationError};
pub use uri::SymbolUri;
pub use symbol::{Span, Symbol, SymbolKind};
pub use edge::{Edge, EdgeKind, EdgeTarget, ResolutionTier};
pub use language::Language;
pub use graph::{GraphVersion, SymbolGraph};
pub use storage::SqliteStore;
pub use pipeline::Orchestrator;
