//! Reference linking
//!
//! Resolves the raw references collected by the adapters against every
//! symbol of a snapshot.

pub mod index;
pub mod global_linker;

pub use global_linker::{GlobalLinker, GlobalLinkerStats};
pub use index::SymbolIndex;
