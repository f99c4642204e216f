//! Database schema definitions
//!
//! Graph rows are keyed by `(project_id, seq)`. A version's rows become
//! visible together when its `graph_versions` row commits.

pub const CREATE_PROJECTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    source_location TEXT NOT NULL,
    state TEXT NOT NULL,
    current_version INTEGER,
    last_error TEXT,
    warning TEXT,
    active_snapshot TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

pub const CREATE_SNAPSHOTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    root TEXT NOT NULL,
    head_commit TEXT,
    manifest TEXT NOT NULL
)
"#;

pub const CREATE_GRAPH_VERSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS graph_versions (
    project_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    snapshot_id TEXT NOT NULL,
    snapshot_hash TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (project_id, seq)
)
"#;

pub const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    project_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    path TEXT NOT NULL,
    language TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    reason TEXT,
    PRIMARY KEY (project_id, seq, path)
)
"#;

pub const CREATE_SYMBOLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS symbols (
    project_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    uri TEXT NOT NULL,
    kind TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    path TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    start_col INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    end_col INTEGER NOT NULL,
    signature TEXT,
    doc TEXT,
    parent TEXT,
    PRIMARY KEY (project_id, seq, uri)
)
"#;

/// `target_uri` is NULL for unresolved edges; `candidates` is a JSON array.
pub const CREATE_EDGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS edges (
    project_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    ord INTEGER NOT NULL,
    from_uri TEXT NOT NULL,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    target_uri TEXT,
    tier TEXT,
    candidates TEXT NOT NULL DEFAULT '[]',
    line INTEGER NOT NULL,
    PRIMARY KEY (project_id, seq, ord)
)
"#;

/// Append-only; the newest `generated` row per key is the current document.
pub const CREATE_DOCUMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL,
    target TEXT NOT NULL,
    kind TEXT NOT NULL,
    version INTEGER NOT NULL,
    status TEXT NOT NULL,
    content TEXT,
    source_fingerprint TEXT NOT NULL,
    error TEXT,
    created_at TEXT NOT NULL
)
"#;

pub const CREATE_QUERY_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS query_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    question TEXT NOT NULL,
    subgraph_fingerprint TEXT,
    answer TEXT,
    asked_at TEXT NOT NULL
)
"#;

pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_snapshots_project ON snapshots(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_symbols_path ON symbols(project_id, seq, path)",
    "CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(project_id, seq, from_uri)",
    "CREATE INDEX IF NOT EXISTS idx_documents_key ON documents(project_id, target, kind, status)",
    "CREATE INDEX IF NOT EXISTS idx_query_records_project ON query_records(project_id)",
];

/// Tables holding per-version graph rows
pub const VERSIONED_TABLES: &[&str] = &["files", "symbols", "edges", "graph_versions"];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_PROJECTS_TABLE,
        CREATE_SNAPSHOTS_TABLE,
        CREATE_GRAPH_VERSIONS_TABLE,
        CREATE_FILES_TABLE,
        CREATE_SYMBOLS_TABLE,
        CREATE_EDGES_TABLE,
        CREATE_DOCUMENTS_TABLE,
        CREATE_QUERY_RECORDS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
