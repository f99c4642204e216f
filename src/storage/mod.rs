//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - projects, snapshots
//! - graph_versions, files, symbols, edges (one row set per version)
//! - documents (append-only)
//! - query_records

pub mod schema;
pub mod sqlite;

pub use sqlite::{Collected, SqliteStore};
