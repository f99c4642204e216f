//! Documentation synthesis
//!
//! Bounded, deterministic context assembly over a graph version, and the
//! synthesizer that turns those contexts into stored documents.

pub mod context;
pub mod synthesizer;

pub use context::{SynthesisContext, assemble, source_fingerprint};
pub use synthesizer::{SynthesisReport, Synthesizer};
