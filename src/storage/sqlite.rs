//! SQLite storage implementation

use super::schema;
use crate::edge::{Edge, EdgeKind, EdgeTarget, ResolutionTier};
use crate::graph::{GraphVersion, SymbolGraph};
use crate::language::Language;
use crate::model::{
    Document, DocumentKind, DocumentStatus, DocumentTarget, FileRecord, ParseStatus, Project, ProjectId, QueryRecord,
    Snapshot, SnapshotFile, SnapshotId,
};
use crate::pipeline::state::PipelineState;
use crate::symbol::{Span, Symbol, SymbolKind};
use crate::uri::SymbolUri;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// What [`SqliteStore::garbage_collect`] removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collected {
    pub versions: Vec<u64>,
    /// Roots of snapshots no longer referenced, to be removed from disk
    pub snapshot_roots: Vec<PathBuf>,
}

/// SQLite-backed store shared by the orchestrator, synthesizer and oracle.
///
/// One connection behind a mutex. Graph rows for a version are written in
/// a single transaction, so readers never see a partial version.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn conversion<E: std::error::Error + Send + Sync + 'static>(col: usize, e: E) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e))
}

fn parse_col<T>(row: &Row, col: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(col)?;
    text.parse().map_err(|e| conversion(col, e))
}

fn uuid_col(row: &Row, col: usize) -> rusqlite::Result<Uuid> {
    parse_col(row, col)
}

fn time_col(row: &Row, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(col)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion(col, e))
}

fn opt_uuid_col(row: &Row, col: usize) -> rusqlite::Result<Option<Uuid>> {
    let text: Option<String> = row.get(col)?;
    text.map(|t| t.parse().map_err(|e| conversion(col, e))).transpose()
}

fn uri_col(row: &Row, col: usize) -> rusqlite::Result<SymbolUri> {
    let text: String = row.get(col)?;
    SymbolUri::parse(&text).map_err(|e| conversion(col, e))
}

const PROJECT_COLUMNS: &str =
    "id, source_location, state, current_version, last_error, warning, active_snapshot, created_at, updated_at";

const DOCUMENT_COLUMNS: &str =
    "project_id, target, kind, version, status, content, source_fingerprint, error, created_at";

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned("sqlite connection"))
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(())
    }

    // ========== Project Operations ==========

    pub fn insert_project(&self, project: &Project) -> Result<()> {
        self.conn()?.execute(
            &format!("INSERT INTO projects ({PROJECT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            params![
                project.id.to_string(),
                project.source_location,
                project.state.as_str(),
                project.current_version.map(|v| v as i64),
                project.last_error,
                project.warning,
                project.active_snapshot.map(|s| s.to_string()),
                project.created_at.to_rfc3339(),
                project.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Persist a project's pipeline bookkeeping.
    ///
    /// The published version pointer is owned by [`Self::publish_version`] and
    /// is not written here.
    pub fn save_project(&self, project: &Project) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE projects SET state = ?2, last_error = ?3, warning = ?4, active_snapshot = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                project.id.to_string(),
                project.state.as_str(),
                project.last_error,
                project.warning,
                project.active_snapshot.map(|s| s.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(Error::ProjectNotFound(project.id));
        }
        Ok(())
    }

    pub fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
        self.conn()?
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                [id.to_string()],
                Self::row_to_project,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at, id"))?;
        let projects = stmt.query_map([], Self::row_to_project)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
        let version: Option<i64> = row.get(3)?;
        Ok(Project {
            id: uuid_col(row, 0)?,
            source_location: row.get(1)?,
            state: parse_col::<PipelineState>(row, 2)?,
            current_version: version.map(|v| v as u64),
            last_error: row.get(4)?,
            warning: row.get(5)?,
            active_snapshot: opt_uuid_col(row, 6)?,
            created_at: time_col(row, 7)?,
            updated_at: time_col(row, 8)?,
        })
    }

    // ========== Snapshot Operations ==========

    pub fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let manifest = serde_json::to_string(&snapshot.files)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO snapshots (id, project_id, fetched_at, content_hash, root, head_commit, manifest)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                snapshot.id.to_string(),
                snapshot.project_id.to_string(),
                snapshot.fetched_at.to_rfc3339(),
                snapshot.content_hash,
                snapshot.root.to_string_lossy(),
                snapshot.head_commit,
                manifest,
            ],
        )?;
        Ok(())
    }

    pub fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, project_id, fetched_at, content_hash, root, head_commit, manifest FROM snapshots WHERE id = ?1",
                [id.to_string()],
                |row| {
                    let root: String = row.get(4)?;
                    let manifest: String = row.get(6)?;
                    Ok((
                        Snapshot {
                            id: uuid_col(row, 0)?,
                            project_id: uuid_col(row, 1)?,
                            fetched_at: time_col(row, 2)?,
                            content_hash: row.get(3)?,
                            root: PathBuf::from(root),
                            head_commit: row.get(5)?,
                            files: Vec::new(),
                        },
                        manifest,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((mut snapshot, manifest)) => {
                snapshot.files = serde_json::from_str::<Vec<SnapshotFile>>(&manifest)?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    pub fn delete_snapshot(&self, id: SnapshotId) -> Result<()> {
        self.conn()?.execute("DELETE FROM snapshots WHERE id = ?1", [id.to_string()])?;
        Ok(())
    }

    // ========== Graph Version Operations ==========

    /// Next unused sequence number for a project
    pub fn next_version(&self, project: ProjectId) -> Result<u64> {
        let conn = self.conn()?;
        let max_seq: Option<i64> = conn.query_row(
            "SELECT MAX(seq) FROM graph_versions WHERE project_id = ?1",
            [project.to_string()],
            |row| row.get(0),
        )?;
        let current: Option<i64> = conn
            .query_row("SELECT current_version FROM projects WHERE id = ?1", [project.to_string()], |row| row.get(0))
            .optional()?
            .flatten();
        // documents of an interrupted run keep their number taken
        let max_doc: Option<i64> = conn.query_row(
            "SELECT MAX(version) FROM documents WHERE project_id = ?1",
            [project.to_string()],
            |row| row.get(0),
        )?;
        let highest = [max_seq, current, max_doc].into_iter().flatten().max().unwrap_or(0);
        Ok(highest as u64 + 1)
    }

    /// Write every row of a version in one transaction.
    pub fn commit_graph_version(&self, version: &GraphVersion) -> Result<()> {
        self.commit_graph_version_unless(version, &AtomicBool::new(false)).map(|_| ())
    }

    /// Like [`Self::commit_graph_version`], but rolls back when `abandoned`
    /// is set by the time the rows are written. Returns whether it committed.
    ///
    /// The flag is read under the connection lock, so a caller that sets it
    /// and then calls [`Self::discard_graph_version`] never leaves the
    /// version behind.
    pub fn commit_graph_version_unless(&self, version: &GraphVersion, abandoned: &AtomicBool) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let project = version.project_id.to_string();
        let seq = version.version as i64;

        tx.execute(
            "INSERT INTO graph_versions (project_id, seq, snapshot_id, snapshot_hash, fingerprint, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                project,
                seq,
                version.snapshot_id.to_string(),
                version.snapshot_hash,
                version.fingerprint,
                version.created_at.to_rfc3339(),
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO files (project_id, seq, path, language, content_hash, status, reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for file in &version.files {
                stmt.execute(params![
                    project,
                    seq,
                    file.path,
                    file.language.as_str(),
                    file.content_hash,
                    file.status.as_str(),
                    file.reason,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO symbols (project_id, seq, uri, kind, qualified_name, path, start_line, start_col, end_line, end_col, signature, doc, parent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for symbol in version.graph.all_symbols() {
                stmt.execute(params![
                    project,
                    seq,
                    symbol.uri.to_uri_string(),
                    symbol.kind.as_str(),
                    symbol.qualified_name,
                    symbol.path,
                    symbol.span.start_line,
                    symbol.span.start_col,
                    symbol.span.end_line,
                    symbol.span.end_col,
                    symbol.signature,
                    symbol.doc,
                    symbol.parent.as_ref().map(|p| p.to_uri_string()),
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO edges (project_id, seq, ord, from_uri, kind, name, target_uri, tier, candidates, line)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for (ord, edge) in version.graph.all_edges().iter().enumerate() {
                let (target_uri, tier, candidates) = match &edge.target {
                    EdgeTarget::Resolved { uri, tier } => (Some(uri.to_uri_string()), Some(tier.as_str()), "[]".to_string()),
                    EdgeTarget::Unresolved { candidates } => (None, None, serde_json::to_string(candidates)?),
                };
                stmt.execute(params![
                    project,
                    seq,
                    ord as i64,
                    edge.from_uri.to_uri_string(),
                    edge.kind.as_str(),
                    edge.name,
                    target_uri,
                    tier,
                    candidates,
                    edge.line,
                ])?;
            }
        }

        if abandoned.load(Ordering::SeqCst) {
            tx.rollback()?;
            debug!(project = %version.project_id, version = version.version, "graph version abandoned before commit");
            return Ok(false);
        }
        tx.commit()?;
        debug!(project = %version.project_id, version = version.version, "graph version committed");
        Ok(true)
    }

    /// Remove an unpublished version's rows
    pub fn discard_graph_version(&self, project: ProjectId, seq: u64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let published: Option<i64> = tx
            .query_row("SELECT current_version FROM projects WHERE id = ?1", [project.to_string()], |row| row.get(0))
            .optional()?
            .flatten();
        if published == Some(seq as i64) {
            return Err(Error::Corrupt(format!("refusing to discard published version {seq}")));
        }
        for table in schema::VERSIONED_TABLES {
            tx.execute(
                &format!("DELETE FROM {table} WHERE project_id = ?1 AND seq = ?2"),
                params![project.to_string(), seq as i64],
            )?;
        }
        // Older versions were published at some point and their documents may
        // still be the latest for a target; a newer one never was.
        if published.is_none_or(|current| seq as i64 > current) {
            tx.execute(
                "DELETE FROM documents WHERE project_id = ?1 AND version = ?2",
                params![project.to_string(), seq as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Discard every committed version newer than the published one.
    pub fn discard_unpublished_versions(&self, project: ProjectId) -> Result<usize> {
        let published = self.published_version(project)?.unwrap_or(0);
        let unpublished: Vec<u64> = self.list_versions(project)?.into_iter().filter(|seq| *seq > published).collect();
        for seq in &unpublished {
            self.discard_graph_version(project, *seq)?;
        }
        Ok(unpublished.len())
    }

    /// Advance the project's published pointer to `seq`.
    ///
    /// Only moves forward and only to a committed version. Returns whether
    /// the pointer moved.
    pub fn publish_version(&self, project: ProjectId, seq: u64) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE projects SET current_version = ?2, updated_at = ?3
             WHERE id = ?1
               AND (current_version IS NULL OR current_version < ?2)
               AND EXISTS (SELECT 1 FROM graph_versions WHERE project_id = ?1 AND seq = ?2)",
            params![project.to_string(), seq as i64, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(changed == 1)
    }

    pub fn published_version(&self, project: ProjectId) -> Result<Option<u64>> {
        let version: Option<i64> = self
            .conn()?
            .query_row("SELECT current_version FROM projects WHERE id = ?1", [project.to_string()], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(version.map(|v| v as u64))
    }

    /// Committed sequence numbers, newest first
    pub fn list_versions(&self, project: ProjectId) -> Result<Vec<u64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT seq FROM graph_versions WHERE project_id = ?1 ORDER BY seq DESC")?;
        let seqs = stmt
            .query_map([project.to_string()], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(seqs.into_iter().map(|s| s as u64).collect())
    }

    pub fn load_graph_version(&self, project: ProjectId, seq: u64) -> Result<Option<GraphVersion>> {
        let conn = self.conn()?;
        let (project_key, seq_key) = (project.to_string(), seq as i64);
        let key = params![project_key, seq_key];

        let header = conn
            .query_row(
                "SELECT snapshot_id, snapshot_hash, fingerprint, created_at FROM graph_versions WHERE project_id = ?1 AND seq = ?2",
                key,
                |row| Ok((uuid_col(row, 0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?, time_col(row, 3)?)),
            )
            .optional()?;
        let Some((snapshot_id, snapshot_hash, fingerprint, created_at)) = header else {
            return Ok(None);
        };

        let files = {
            let mut stmt = conn.prepare(
                "SELECT path, language, content_hash, status, reason FROM files WHERE project_id = ?1 AND seq = ?2 ORDER BY path",
            )?;
            stmt.query_map(key, |row| {
                Ok(FileRecord {
                    path: row.get(0)?,
                    language: parse_col::<Language>(row, 1)?,
                    content_hash: row.get(2)?,
                    status: parse_col::<ParseStatus>(row, 3)?,
                    reason: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let symbols = {
            let mut stmt = conn.prepare(
                "SELECT uri, kind, qualified_name, path, start_line, start_col, end_line, end_col, signature, doc, parent
                 FROM symbols WHERE project_id = ?1 AND seq = ?2 ORDER BY uri",
            )?;
            stmt.query_map(key, Self::row_to_symbol)?.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let edges = {
            let mut stmt = conn.prepare(
                "SELECT from_uri, kind, name, target_uri, tier, candidates, line
                 FROM edges WHERE project_id = ?1 AND seq = ?2 ORDER BY ord",
            )?;
            stmt.query_map(key, Self::row_to_edge)?.collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(Some(GraphVersion {
            project_id: project,
            version: seq,
            snapshot_id,
            snapshot_hash,
            created_at,
            files,
            graph: SymbolGraph::from_parts(symbols, edges),
            fingerprint,
        }))
    }

    fn row_to_symbol(row: &Row) -> rusqlite::Result<Symbol> {
        let uri = uri_col(row, 0)?;
        let qualified_name: String = row.get(2)?;
        let parent: Option<String> = row.get(10)?;
        let parent = parent.map(|p| SymbolUri::parse(&p).map_err(|e| conversion(10, e))).transpose()?;

        Ok(Symbol {
            kind: parse_col::<SymbolKind>(row, 1)?,
            name: qualified_name.rsplit('.').next().unwrap_or(&qualified_name).to_string(),
            path: row.get(3)?,
            span: Span::new(row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?),
            signature: row.get(8)?,
            doc: row.get(9)?,
            parent,
            qualified_name,
            uri,
        })
    }

    fn row_to_edge(row: &Row) -> rusqlite::Result<Edge> {
        let from_uri = uri_col(row, 0)?;
        let kind = parse_col::<EdgeKind>(row, 1)?;
        let name: String = row.get(2)?;
        let target_uri: Option<String> = row.get(3)?;
        let tier: Option<String> = row.get(4)?;
        let candidates: String = row.get(5)?;
        let line: u32 = row.get(6)?;

        match (target_uri, tier) {
            (Some(uri), Some(tier)) => {
                let uri = SymbolUri::parse(&uri).map_err(|e| conversion(3, e))?;
                let tier: ResolutionTier = tier.parse().map_err(|e| conversion(4, e))?;
                Ok(Edge::resolved(from_uri, kind, name, uri, tier, line))
            }
            _ => {
                let candidates: Vec<SymbolUri> = serde_json::from_str(&candidates).map_err(|e| conversion(5, e))?;
                Ok(Edge::unresolved(from_uri, kind, name, candidates, line))
            }
        }
    }

    /// Drop committed versions beyond the newest `keep`, never the published one.
    ///
    /// Snapshot rows no remaining version uses (and that are not the
    /// project's active snapshot) go too; their roots are returned for the
    /// caller to remove from disk.
    pub fn garbage_collect(&self, project: ProjectId, keep: usize) -> Result<Collected> {
        let published = self.published_version(project)?;
        let stale: Vec<u64> = self
            .list_versions(project)?
            .into_iter()
            .skip(keep.max(1))
            .filter(|seq| Some(*seq) != published)
            .collect();

        let mut collected = Collected::default();
        for seq in stale {
            let snapshot = self.version_snapshot(project, seq)?;
            self.discard_graph_version(project, seq)?;
            collected.versions.push(seq);
            if let Some(snapshot) = snapshot {
                if let Some(root) = self.release_snapshot(project, snapshot)? {
                    collected.snapshot_roots.push(root);
                }
            }
        }
        if !collected.versions.is_empty() {
            debug!(
                project = %project,
                removed = collected.versions.len(),
                snapshots = collected.snapshot_roots.len(),
                "old graph versions collected"
            );
        }
        Ok(collected)
    }

    fn version_snapshot(&self, project: ProjectId, seq: u64) -> Result<Option<SnapshotId>> {
        let id: Option<String> = self
            .conn()?
            .query_row(
                "SELECT snapshot_id FROM graph_versions WHERE project_id = ?1 AND seq = ?2",
                params![project.to_string(), seq as i64],
                |row| row.get(0),
            )
            .optional()?;
        id.map(|id| id.parse::<Uuid>().map_err(|e| Error::Corrupt(format!("snapshot id {id}: {e}"))))
            .transpose()
    }

    /// Delete a snapshot row once nothing refers to it. Returns its root.
    fn release_snapshot(&self, project: ProjectId, snapshot: SnapshotId) -> Result<Option<PathBuf>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let in_use: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM graph_versions WHERE project_id = ?1 AND snapshot_id = ?2)
                 OR EXISTS (SELECT 1 FROM projects WHERE id = ?1 AND active_snapshot = ?2)",
            params![project.to_string(), snapshot.to_string()],
            |row| row.get(0),
        )?;
        if in_use {
            return Ok(None);
        }
        let root: Option<String> = tx
            .query_row("SELECT root FROM snapshots WHERE id = ?1", [snapshot.to_string()], |row| row.get(0))
            .optional()?;
        tx.execute("DELETE FROM snapshots WHERE id = ?1", [snapshot.to_string()])?;
        tx.commit()?;
        Ok(root.map(PathBuf::from))
    }

    // ========== Document Operations ==========

    pub fn insert_document(&self, doc: &Document) -> Result<()> {
        self.conn()?.execute(
            &format!("INSERT INTO documents ({DOCUMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            params![
                doc.project_id.to_string(),
                doc.target.as_key(),
                doc.kind.as_str(),
                doc.version as i64,
                doc.status.as_str(),
                doc.content,
                doc.source_fingerprint,
                doc.error,
                doc.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Newest generated document for a key, among published versions
    pub fn latest_document(&self, project: ProjectId, target: &DocumentTarget, kind: DocumentKind) -> Result<Option<Document>> {
        self.latest_document_where(project, target, kind, None)
    }

    /// Newest generated document a run building version `seq` may reuse:
    /// its own rows or those of published versions.
    pub fn latest_document_for(
        &self,
        project: ProjectId,
        target: &DocumentTarget,
        kind: DocumentKind,
        seq: u64,
    ) -> Result<Option<Document>> {
        self.latest_document_where(project, target, kind, Some(seq))
    }

    fn latest_document_where(
        &self,
        project: ProjectId,
        target: &DocumentTarget,
        kind: DocumentKind,
        own: Option<u64>,
    ) -> Result<Option<Document>> {
        self.conn()?
            .query_row(
                &format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents
                     WHERE project_id = ?1 AND target = ?2 AND kind = ?3 AND status = 'generated'
                       AND (version = ?4
                            OR version <= COALESCE((SELECT current_version FROM projects WHERE id = ?1), 0))
                     ORDER BY id DESC LIMIT 1"
                ),
                params![project.to_string(), target.as_key(), kind.as_str(), own.map(|v| v as i64)],
                Self::row_to_document,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Every row for a key, oldest first
    pub fn document_history(&self, project: ProjectId, target: &DocumentTarget, kind: DocumentKind) -> Result<Vec<Document>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE project_id = ?1 AND target = ?2 AND kind = ?3 ORDER BY id"
        ))?;
        let docs = stmt
            .query_map(params![project.to_string(), target.as_key(), kind.as_str()], Self::row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs)
    }

    fn row_to_document(row: &Row) -> rusqlite::Result<Document> {
        let target: String = row.get(1)?;
        let version: i64 = row.get(3)?;
        Ok(Document {
            project_id: uuid_col(row, 0)?,
            target: DocumentTarget::parse(&target).map_err(|e| conversion(1, e))?,
            kind: parse_col::<DocumentKind>(row, 2)?,
            version: version as u64,
            status: parse_col::<DocumentStatus>(row, 4)?,
            content: row.get(5)?,
            source_fingerprint: row.get(6)?,
            error: row.get(7)?,
            created_at: time_col(row, 8)?,
        })
    }

    // ========== Query Records ==========

    pub fn insert_query_record(&self, record: &QueryRecord) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO query_records (project_id, version, question, subgraph_fingerprint, answer, asked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.project_id.to_string(),
                record.version as i64,
                record.question,
                record.subgraph_fingerprint,
                record.answer,
                record.asked_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn query_records(&self, project: ProjectId) -> Result<Vec<QueryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT project_id, version, question, subgraph_fingerprint, answer, asked_at
             FROM query_records WHERE project_id = ?1 ORDER BY id",
        )?;
        let records = stmt
            .query_map([project.to_string()], |row| {
                let version: i64 = row.get(1)?;
                Ok(QueryRecord {
                    project_id: uuid_col(row, 0)?,
                    version: version as u64,
                    question: row.get(2)?,
                    subgraph_fingerprint: row.get(3)?,
                    answer: row.get(4)?,
                    asked_at: time_col(row, 5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{extract_file, registry};
    use crate::config::ExtractConfig;
    use crate::graph::build_graph;

    fn sample_version(project: ProjectId, seq: u64, files: &[(&str, &str)]) -> GraphVersion {
        let extractions = files
            .iter()
            .map(|(p, s)| extract_file(registry(), &project.to_string(), p, s.as_bytes(), &ExtractConfig::default()))
            .collect();
        GraphVersion::new(project, seq, Uuid::new_v4(), format!("snap-{seq}"), build_graph(extractions))
    }

    fn store_with_project() -> (SqliteStore, Project) {
        let store = SqliteStore::open_in_memory().unwrap();
        let project = Project::new("https://github.com/o/r");
        store.insert_project(&project).unwrap();
        (store, project)
    }

    #[test]
    fn test_project_crud() {
        let (store, mut project) = store_with_project();
        project.state = PipelineState::Error;
        project.last_error = Some("boom".into());
        store.save_project(&project).unwrap();

        let loaded = store.get_project(project.id).unwrap().unwrap();
        assert_eq!(loaded.state, PipelineState::Error);
        assert_eq!(loaded.last_error.as_deref(), Some("boom"));
        assert_eq!(store.list_projects().unwrap().len(), 1);
        assert!(store.get_project(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_version_roundtrip_preserves_graph() {
        let (store, project) = store_with_project();
        let version = sample_version(project.id, 1, &[("a.py", "def f():\n    \"\"\"Doc.\"\"\"\n"), ("b.py", "from a import f\nf()\nprint(1)\n")]);
        store.commit_graph_version(&version).unwrap();

        let loaded = store.load_graph_version(project.id, 1).unwrap().unwrap();
        assert_eq!(loaded.fingerprint, version.fingerprint);
        assert_eq!(loaded.files, version.files);
        assert_eq!(loaded.graph.all_edges(), version.graph.all_edges());
        assert_eq!(loaded.graph.symbol_count(), version.graph.symbol_count());
        assert_eq!(crate::graph::version::edge_fingerprint(&loaded.graph), version.fingerprint);
    }

    #[test]
    fn test_publish_only_moves_forward_to_committed_versions() {
        let (store, project) = store_with_project();
        assert_eq!(store.next_version(project.id).unwrap(), 1);
        assert!(!store.publish_version(project.id, 1).unwrap());

        for seq in 1..=2 {
            store.commit_graph_version(&sample_version(project.id, seq, &[("a.py", "x = 1\n")])).unwrap();
        }
        assert!(store.publish_version(project.id, 2).unwrap());
        assert!(!store.publish_version(project.id, 1).unwrap());
        assert_eq!(store.published_version(project.id).unwrap(), Some(2));
        assert_eq!(store.next_version(project.id).unwrap(), 3);
        assert!(store.discard_graph_version(project.id, 2).is_err());
    }

    #[test]
    fn test_garbage_collect_keeps_newest_and_published() {
        let (store, project) = store_with_project();
        for seq in 1..=4 {
            store.commit_graph_version(&sample_version(project.id, seq, &[("a.py", "x = 1\n")])).unwrap();
        }
        store.publish_version(project.id, 1).unwrap();

        let collected = store.garbage_collect(project.id, 2).unwrap();
        assert_eq!(collected.versions, vec![2]);
        assert_eq!(store.list_versions(project.id).unwrap(), vec![4, 3, 1]);
    }

    fn snapshot_for(project: ProjectId, root: &str) -> Snapshot {
        Snapshot {
            id: Uuid::new_v4(),
            project_id: project,
            fetched_at: Utc::now(),
            content_hash: format!("hash-{root}"),
            root: PathBuf::from(root),
            head_commit: None,
            files: Vec::new(),
        }
    }

    #[test]
    fn test_garbage_collect_releases_unused_snapshots() {
        let (store, mut project) = store_with_project();
        let mut snapshots = Vec::new();
        for seq in 1..=3u64 {
            let snapshot = snapshot_for(project.id, &format!("/ws/p/{seq}"));
            store.insert_snapshot(&snapshot).unwrap();
            let mut version = sample_version(project.id, seq, &[("a.py", "x = 1\n")]);
            version.snapshot_id = snapshot.id;
            store.commit_graph_version(&version).unwrap();
            snapshots.push(snapshot);
        }
        store.publish_version(project.id, 3).unwrap();
        project.active_snapshot = Some(snapshots[2].id);
        store.save_project(&project).unwrap();

        let collected = store.garbage_collect(project.id, 1).unwrap();
        assert_eq!(collected.versions, vec![2, 1]);
        assert_eq!(collected.snapshot_roots, vec![PathBuf::from("/ws/p/2"), PathBuf::from("/ws/p/1")]);
        assert!(store.get_snapshot(snapshots[0].id).unwrap().is_none());
        assert!(store.get_snapshot(snapshots[2].id).unwrap().is_some());
    }

    #[test]
    fn test_abandoned_commit_rolls_back() {
        let (store, project) = store_with_project();
        let version = sample_version(project.id, 1, &[("a.py", "x = 1\n")]);

        let committed = store.commit_graph_version_unless(&version, &AtomicBool::new(true)).unwrap();
        assert!(!committed);
        assert!(store.list_versions(project.id).unwrap().is_empty());
        assert!(store.load_graph_version(project.id, 1).unwrap().is_none());
    }

    #[test]
    fn test_latest_document_skips_failed_rows() {
        let (store, project) = store_with_project();
        let target = DocumentTarget::File("a.py".into());
        let doc = |version, status, content: Option<&str>| Document {
            project_id: project.id,
            target: target.clone(),
            kind: DocumentKind::Summary,
            version,
            status,
            content: content.map(String::from),
            source_fingerprint: format!("fp{version}"),
            error: None,
            created_at: Utc::now(),
        };
        for seq in 1..=2 {
            store.commit_graph_version(&sample_version(project.id, seq, &[("a.py", "x = 1\n")])).unwrap();
        }
        store.publish_version(project.id, 2).unwrap();
        store.insert_document(&doc(1, DocumentStatus::Generated, Some("first"))).unwrap();
        store.insert_document(&doc(2, DocumentStatus::Failed, None)).unwrap();

        let latest = store.latest_document(project.id, &target, DocumentKind::Summary).unwrap().unwrap();
        assert_eq!(latest.version, 1);
        assert_eq!(latest.content.as_deref(), Some("first"));
        assert_eq!(store.document_history(project.id, &target, DocumentKind::Summary).unwrap().len(), 2);
        assert!(store.latest_document(project.id, &target, DocumentKind::Reference).unwrap().is_none());
    }

    fn generated(project: ProjectId, path: &str, version: u64) -> Document {
        Document {
            project_id: project,
            target: DocumentTarget::File(path.into()),
            kind: DocumentKind::Summary,
            version,
            status: DocumentStatus::Generated,
            content: Some(format!("v{version}")),
            source_fingerprint: format!("fp{version}"),
            error: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_documents_of_unpublished_versions_stay_hidden() {
        let (store, project) = store_with_project();
        let target = DocumentTarget::File("a.py".into());
        for seq in 1..=2 {
            store.commit_graph_version(&sample_version(project.id, seq, &[("a.py", "x = 1\n")])).unwrap();
            store.insert_document(&generated(project.id, "a.py", seq)).unwrap();
        }
        store.publish_version(project.id, 1).unwrap();

        let latest = store.latest_document(project.id, &target, DocumentKind::Summary).unwrap().unwrap();
        assert_eq!(latest.version, 1);
        // the run building version 2 sees its own rows
        let own = store.latest_document_for(project.id, &target, DocumentKind::Summary, 2).unwrap().unwrap();
        assert_eq!(own.version, 2);

        store.discard_graph_version(project.id, 2).unwrap();
        let history = store.document_history(project.id, &target, DocumentKind::Summary).unwrap();
        assert_eq!(history.iter().map(|d| d.version).collect::<Vec<_>>(), vec![1]);
        assert_eq!(store.next_version(project.id).unwrap(), 2);
    }

    #[test]
    fn test_nothing_published_means_no_documents() {
        let (store, project) = store_with_project();
        store.insert_document(&generated(project.id, "a.py", 1)).unwrap();

        let target = DocumentTarget::File("a.py".into());
        assert!(store.latest_document(project.id, &target, DocumentKind::Summary).unwrap().is_none());
        // the number stays taken even though no graph version exists
        assert_eq!(store.next_version(project.id).unwrap(), 2);
    }

    #[test]
    fn test_discard_unpublished_versions_keeps_published() {
        let (store, project) = store_with_project();
        for seq in 1..=3 {
            store.commit_graph_version(&sample_version(project.id, seq, &[("a.py", "x = 1\n")])).unwrap();
        }
        store.publish_version(project.id, 1).unwrap();

        assert_eq!(store.discard_unpublished_versions(project.id).unwrap(), 2);
        assert_eq!(store.list_versions(project.id).unwrap(), vec![1]);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let (store, project) = store_with_project();
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            project_id: project.id,
            fetched_at: Utc::now(),
            content_hash: "abc".into(),
            root: PathBuf::from("/tmp/ws/x"),
            head_commit: Some("deadbeef".into()),
            files: vec![SnapshotFile { path: "a.py".into(), content_hash: "h".into(), size: 3 }],
        };
        store.insert_snapshot(&snapshot).unwrap();
        let loaded = store.get_snapshot(snapshot.id).unwrap().unwrap();
        assert_eq!(loaded.files, snapshot.files);
        assert_eq!(loaded.head_commit.as_deref(), Some("deadbeef"));
    }
}
