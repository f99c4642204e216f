//! Per-project ingestion pipeline
//!
//! fetch → extract → build → synthesize → publish, driven by a fixed pool of
//! workers with at most one run per project.

pub mod orchestrator;
pub mod state;
pub mod structure;

pub use orchestrator::{DocumentLookup, Orchestrator, PipelineSettings, ProjectStatus, StartOutcome};
pub use state::PipelineState;
pub use structure::{FileNode, ProjectStructure, SymbolNode};
