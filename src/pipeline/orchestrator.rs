//! Pipeline orchestrator
//!
//! Runs are queued jobs drained by `workers` tokio tasks. A per-project
//! in-flight registry keeps one run per project; distinct projects run in
//! parallel. Fetch and provider calls are awaited, extraction and graph
//! building run on blocking threads.
//!
//! Publication swaps an `Arc<GraphVersion>` under a write lock after the
//! store's guarded `publish_version` succeeds: readers see the previous or
//! the new version, never a half-built one.

use super::state::PipelineState;
use super::structure::ProjectStructure;
use crate::adapter::{extract_snapshot, registry};
use crate::config::{Config, ExtractConfig};
use crate::fetch::{FetchRequest, GitFetcher, RepositoryFetcher, redact, remove_snapshot_dir, validate_location};
use crate::graph::{GraphVersion, build_graph, diff_versions};
use crate::model::{Document, DocumentKind, DocumentTarget, Project, ProjectId, RunId, SnapshotId};
use crate::provider::{LanguageModel, RetryPolicy, build_provider};
use crate::query::{AskOutcome, Oracle, validate_question};
use crate::storage::SqliteStore;
use crate::synth::Synthesizer;
use crate::{Error, PipelineError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Knobs the orchestrator reads from [`Config`]
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub workers: usize,
    pub run_timeout: Duration,
    pub synthesize: bool,
    pub keep_versions: usize,
    pub allowed_hosts: Vec<String>,
    pub max_question_chars: usize,
    pub extract: ExtractConfig,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.pipeline.workers.max(1),
            run_timeout: Duration::from_secs(config.pipeline.run_timeout_secs),
            synthesize: config.pipeline.synthesize,
            keep_versions: config.storage.keep_versions,
            allowed_hosts: config.fetch.allowed_hosts.clone(),
            max_question_chars: config.oracle.max_question_chars,
            extract: config.extract.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "run_id", rename_all = "snake_case")]
pub enum StartOutcome {
    Started(RunId),
    AlreadyRunning(RunId),
}

impl StartOutcome {
    pub fn run_id(&self) -> RunId {
        match self {
            StartOutcome::Started(id) | StartOutcome::AlreadyRunning(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub project_id: ProjectId,
    pub source_location: String,
    pub state: PipelineState,
    pub last_graph_version: Option<u64>,
    pub last_error: Option<String>,
    pub warning: Option<String>,
    /// Present while a run is in flight
    pub run_id: Option<RunId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "document", rename_all = "snake_case")]
pub enum DocumentLookup {
    Found(Document),
    NotYetGenerated,
}

struct Job {
    project_id: ProjectId,
    run_id: RunId,
}

/// What a run left behind, for cleanup after failure or timeout
#[derive(Debug, Default)]
struct RunScratch {
    prior_snapshot: Option<SnapshotId>,
    snapshot: Option<(SnapshotId, PathBuf)>,
    /// Set before the commit starts, so a commit cut off by the timeout is still discarded
    version: Option<u64>,
    /// Tells a commit still running on a blocking thread to roll back
    abandoned: Arc<AtomicBool>,
    published: bool,
}

struct Inner {
    store: Arc<SqliteStore>,
    fetcher: Arc<dyn RepositoryFetcher>,
    synthesizer: Synthesizer,
    oracle: Oracle,
    settings: PipelineSettings,
    queue: mpsc::UnboundedSender<Job>,
    in_flight: Mutex<HashMap<ProjectId, RunId>>,
    published: RwLock<HashMap<ProjectId, Arc<GraphVersion>>>,
    /// Held in memory only, never persisted
    credentials: Mutex<HashMap<ProjectId, String>>,
    run_finished: Notify,
}

/// Handle to the pipeline. Cheap to clone; all clones share one worker pool.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Build the orchestrator and spawn its workers on the current runtime.
    pub fn new(
        store: Arc<SqliteStore>,
        fetcher: Arc<dyn RepositoryFetcher>,
        model: Arc<dyn LanguageModel>,
        config: &Config,
    ) -> Self {
        let settings = PipelineSettings::from_config(config);
        let policy = RetryPolicy::from_config(&config.synthesis);
        let (queue, rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            store,
            fetcher,
            synthesizer: Synthesizer::new(model.clone(), config.synthesis.clone()),
            oracle: Oracle::new(model, config.oracle.clone(), policy),
            settings,
            queue,
            in_flight: Mutex::new(HashMap::new()),
            published: RwLock::new(HashMap::new()),
            credentials: Mutex::new(HashMap::new()),
            run_finished: Notify::new(),
        });

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for worker in 0..inner.settings.workers {
            let inner = inner.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let job = rx.lock().await.recv().await;
                    let Some(job) = job else { break };
                    let span = info_span!("run", worker, project = %job.project_id, run = %job.run_id);
                    inner.execute(job).instrument(span).await;
                }
            });
        }

        Self { inner }
    }

    /// Open the configured store, git fetcher and provider cascade.
    pub fn from_config(config: &Config) -> Result<Self> {
        if let Some(parent) = config.storage.database.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::create_dir_all(&config.workspace.dir)?;

        let store = Arc::new(SqliteStore::open(&config.storage.database)?);
        let fetcher = Arc::new(GitFetcher::new(config.workspace.dir.clone(), config.fetch.clone()));
        let model = build_provider(&config.provider);
        info!(provider = model.name(), workers = config.pipeline.workers, "orchestrator ready");
        Ok(Self::new(store, fetcher, model, config))
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.inner.store
    }

    /// Validate the location and record a new project.
    pub fn register_project(&self, source_location: &str, credential: Option<String>) -> Result<Project> {
        let location = validate_location(source_location, &self.inner.settings.allowed_hosts)?;
        let project = Project::new(location.as_str());
        self.inner.store.insert_project(&project)?;

        if let Some(secret) = credential.filter(|c| !c.is_empty()) {
            self.inner.credentials.lock().map_err(|_| Error::LockPoisoned("credentials"))?.insert(project.id, secret);
        }
        info!(project = %project.id, location = %location.as_str(), "project registered");
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.inner.store.list_projects()
    }

    /// Queue a run unless one is already in flight for this project.
    pub fn start_pipeline(&self, project_id: ProjectId) -> Result<StartOutcome> {
        let mut project = self.inner.project(project_id)?;

        let run_id = {
            let mut in_flight = self.inner.in_flight.lock().map_err(|_| Error::LockPoisoned("in-flight registry"))?;
            if let Some(run) = in_flight.get(&project_id) {
                return Ok(StartOutcome::AlreadyRunning(*run));
            }
            let run_id = Uuid::new_v4();
            in_flight.insert(project_id, run_id);
            run_id
        };

        // A persisted in-flight state with no registry entry is left over from a previous process
        if project.state.is_in_flight() {
            warn!(project = %project_id, state = project.state.as_str(), "recovering interrupted run");
            match self.inner.store.discard_unpublished_versions(project_id) {
                Ok(0) => {}
                Ok(discarded) => debug!(project = %project_id, discarded, "interrupted versions discarded"),
                Err(e) => warn!(project = %project_id, error = %e, "could not discard interrupted versions"),
            }
            project.state = PipelineState::Error;
            project.last_error = Some("run interrupted".to_string());
        }

        let queued = project
            .state
            .transition(PipelineState::Queued)
            .map_err(Error::from)
            .and_then(|state| {
                project.state = state;
                self.inner.store.save_project(&project)
            })
            .and_then(|()| self.inner.queue.send(Job { project_id, run_id }).map_err(|_| Error::WorkersStopped));

        if let Err(e) = queued {
            self.inner.release(project_id);
            return Err(e);
        }
        info!(project = %project_id, run = %run_id, "run queued");
        Ok(StartOutcome::Started(run_id))
    }

    pub fn get_status(&self, project_id: ProjectId) -> Result<ProjectStatus> {
        let project = self.inner.project(project_id)?;
        let run_id = self.inner.running(project_id)?;
        Ok(ProjectStatus {
            project_id,
            source_location: project.source_location,
            state: project.state,
            last_graph_version: project.current_version,
            last_error: project.last_error,
            warning: project.warning,
            run_id,
        })
    }

    /// Published version, loading it from the store on first use
    pub fn published_version(&self, project_id: ProjectId) -> Result<Option<Arc<GraphVersion>>> {
        self.inner.published_version(project_id)
    }

    pub fn get_structure(&self, project_id: ProjectId) -> Result<ProjectStructure> {
        self.inner.project(project_id)?;
        let version = self.published_version(project_id)?.ok_or(Error::NoPublishedGraph(project_id))?;
        Ok(ProjectStructure::from_version(&version))
    }

    /// Latest document for a target. Module documents are not part of a run
    /// and are generated against the published version on first request.
    pub async fn get_document(&self, project_id: ProjectId, target: &DocumentTarget, kind: DocumentKind) -> Result<DocumentLookup> {
        self.inner.project(project_id)?;
        if let Some(doc) = self.inner.store.latest_document(project_id, target, kind)? {
            return Ok(DocumentLookup::Found(doc));
        }
        if !matches!(target, DocumentTarget::Module(_)) {
            return Ok(DocumentLookup::NotYetGenerated);
        }
        let Some(version) = self.published_version(project_id)? else {
            return Ok(DocumentLookup::NotYetGenerated);
        };

        if self.inner.synthesizer.synthesize_one(&self.inner.store, &version, target, kind).await? {
            info!(project = %project_id, target = %target, version = version.version, "module document generated");
        }
        Ok(match self.inner.store.latest_document(project_id, target, kind)? {
            Some(doc) => DocumentLookup::Found(doc),
            None => DocumentLookup::NotYetGenerated,
        })
    }

    pub async fn ask(&self, project_id: ProjectId, question: &str) -> Result<AskOutcome> {
        self.inner.project(project_id)?;
        validate_question(question, self.inner.settings.max_question_chars)?;
        let version = self.published_version(project_id)?.ok_or(Error::NoPublishedGraph(project_id))?;
        self.inner.oracle.ask(&self.inner.store, &version, question).await
    }

    /// Wait until no run is in flight for the project.
    pub async fn wait_for_run(&self, project_id: ProjectId, timeout: Duration) -> Result<ProjectStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.run_finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.running(project_id)?.is_none() {
                return self.get_status(project_id);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(PipelineError::TimedOut(timeout.as_secs()).into());
            }
        }
    }
}

impl Inner {
    fn project(&self, project_id: ProjectId) -> Result<Project> {
        self.store.get_project(project_id)?.ok_or(Error::ProjectNotFound(project_id))
    }

    fn running(&self, project_id: ProjectId) -> Result<Option<RunId>> {
        let in_flight = self.in_flight.lock().map_err(|_| Error::LockPoisoned("in-flight registry"))?;
        Ok(in_flight.get(&project_id).copied())
    }

    fn release(&self, project_id: ProjectId) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&project_id);
        }
        self.run_finished.notify_waiters();
    }

    fn credential(&self, project_id: ProjectId) -> Option<String> {
        self.credentials.lock().ok().and_then(|c| c.get(&project_id).cloned())
    }

    fn published_version(&self, project_id: ProjectId) -> Result<Option<Arc<GraphVersion>>> {
        {
            let published = self.published.read().map_err(|_| Error::LockPoisoned("published versions"))?;
            if let Some(version) = published.get(&project_id) {
                return Ok(Some(version.clone()));
            }
        }

        let Some(seq) = self.store.published_version(project_id)? else {
            return Ok(None);
        };
        let Some(loaded) = self.store.load_graph_version(project_id, seq)? else {
            return Err(Error::Corrupt(format!("published version {seq} of {project_id} has no rows")));
        };

        let mut published = self.published.write().map_err(|_| Error::LockPoisoned("published versions"))?;
        let entry = published.entry(project_id).or_insert_with(|| Arc::new(loaded.clone()));
        if entry.version < loaded.version {
            *entry = Arc::new(loaded);
        }
        Ok(Some(entry.clone()))
    }

    fn swap_published(&self, version: Arc<GraphVersion>) -> Result<()> {
        let mut published = self.published.write().map_err(|_| Error::LockPoisoned("published versions"))?;
        published.insert(version.project_id, version);
        Ok(())
    }

    fn advance(&self, project: &mut Project, next: PipelineState) -> std::result::Result<(), PipelineError> {
        project.state = project.state.transition(next)?;
        self.store.save_project(project)?;
        info!(project = %project.id, state = next.as_str(), "stage");
        Ok(())
    }

    async fn execute(&self, job: Job) {
        let scratch = Mutex::new(RunScratch::default());
        let limit = self.settings.run_timeout;

        let outcome = match tokio::time::timeout(limit, self.run_stages(&job, &scratch)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::TimedOut(limit.as_secs())),
        };

        if let Err(err) = outcome {
            let scratch = scratch.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.fail_run(job.project_id, err, scratch);
        }
        self.release(job.project_id);
    }

    async fn run_stages(&self, job: &Job, scratch: &Mutex<RunScratch>) -> std::result::Result<(), PipelineError> {
        let mut project = self.project(job.project_id)?;
        project.last_error = None;
        note(scratch, |s| s.prior_snapshot = project.active_snapshot);
        self.advance(&mut project, PipelineState::Fetching)?;

        let credential = self.credential(project.id);
        let request = FetchRequest {
            project_id: project.id,
            snapshot_id: Uuid::new_v4(),
            location: project.source_location.clone(),
            credential,
        };
        let snapshot = Arc::new(self.fetcher.fetch(&request).await?);
        note(scratch, |s| s.snapshot = Some((snapshot.id, snapshot.root.clone())));

        let current = self.published_version(project.id)?;
        if let Some(current) = &current {
            if current.snapshot_hash == snapshot.content_hash {
                info!(project = %project.id, version = current.version, "snapshot unchanged, keeping the published version");
                if let Err(e) = remove_snapshot_dir(&snapshot.root) {
                    warn!(path = %snapshot.root.display(), error = %e, "could not remove unchanged snapshot");
                }
                note(scratch, |s| s.snapshot = None);
                project.warning = None;
                self.advance(&mut project, PipelineState::Ready)?;
                return Ok(());
            }
        }

        self.store.insert_snapshot(&snapshot)?;
        project.active_snapshot = Some(snapshot.id);
        self.advance(&mut project, PipelineState::Extracting)?;

        let extractions = {
            let snapshot = snapshot.clone();
            let limits = self.settings.extract.clone();
            tokio::task::spawn_blocking(move || extract_snapshot(registry(), &snapshot, &limits))
                .await
                .map_err(|e| PipelineError::Extract(e.to_string()))?
        };
        let failed = extractions.iter().filter(|e| !e.record.status.has_symbols()).count();
        debug!(project = %project.id, files = extractions.len(), without_symbols = failed, "extraction finished");

        self.advance(&mut project, PipelineState::Building)?;
        let build = tokio::task::spawn_blocking(move || build_graph(extractions))
            .await
            .map_err(|e| PipelineError::Build(e.to_string()))?;

        let seq = self.store.next_version(project.id)?;
        let version = Arc::new(GraphVersion::new(project.id, seq, snapshot.id, snapshot.content_hash.clone(), build));
        let mut abandoned: Arc<AtomicBool> = Arc::default();
        note(scratch, |s| {
            s.version = Some(seq);
            abandoned = s.abandoned.clone();
        });
        {
            let store = self.store.clone();
            let version = version.clone();
            let committed = tokio::task::spawn_blocking(move || store.commit_graph_version_unless(&version, &abandoned))
                .await
                .map_err(|e| PipelineError::Storage(e.to_string()))??;
            if !committed {
                return Err(PipelineError::Storage(format!("version {seq} was abandoned before commit")));
            }
        }
        if let Some(previous) = &current {
            let diff = diff_versions(previous, &version);
            info!(
                project = %project.id,
                since = previous.version,
                added = diff.added.len(),
                changed = diff.changed.len(),
                removed = diff.removed.len(),
                "files changed"
            );
        }

        self.advance(&mut project, PipelineState::Synthesizing)?;
        project.warning = None;
        if self.settings.synthesize {
            match self.synthesizer.synthesize(&self.store, &version).await {
                Ok(report) => project.warning = report.warning,
                Err(e) => {
                    warn!(project = %project.id, error = %e, "synthesis aborted");
                    project.warning = Some(format!("synthesis aborted: {e}"));
                }
            }
        }

        if self.store.publish_version(project.id, seq)? {
            self.swap_published(version.clone())?;
            note(scratch, |s| s.published = true);
        } else {
            warn!(project = %project.id, version = seq, "a newer version is already published");
        }

        match self.store.garbage_collect(project.id, self.settings.keep_versions) {
            Ok(collected) => {
                for root in &collected.snapshot_roots {
                    if let Err(e) = remove_snapshot_dir(root) {
                        warn!(path = %root.display(), error = %e, "could not remove collected snapshot");
                    }
                }
                if !collected.versions.is_empty() {
                    debug!(
                        project = %project.id,
                        versions = collected.versions.len(),
                        snapshots = collected.snapshot_roots.len(),
                        "old versions removed"
                    );
                }
            }
            Err(e) => warn!(project = %project.id, error = %e, "version garbage collection failed"),
        }

        self.advance(&mut project, PipelineState::Ready)?;
        info!(
            project = %project.id,
            version = seq,
            stats = %version.graph.stats(),
            warning = project.warning.as_deref().unwrap_or("none"),
            "run finished"
        );
        Ok(())
    }

    /// Mark the project failed and drop whatever the run produced but did not publish.
    fn fail_run(&self, project_id: ProjectId, err: PipelineError, scratch: RunScratch) {
        let message = redact(&err.to_string(), self.credential(project_id).as_deref());
        error!(project = %project_id, error = %message, "run failed");

        let RunScratch { prior_snapshot, snapshot, version, abandoned, published } = scratch;
        abandoned.store(true, Ordering::SeqCst);
        if published {
            // failed after the swap: the published version stays, only the state changes
            debug!(project = %project_id, "run failed after publication");
        }

        if let (Some(seq), false) = (version, published) {
            if let Err(e) = self.store.discard_graph_version(project_id, seq) {
                warn!(project = %project_id, version = seq, error = %e, "could not discard unpublished version");
            }
        }
        let discarded_snapshot = !published && snapshot.is_some();
        if let (Some((snapshot_id, root)), false) = (snapshot, published) {
            if let Err(e) = remove_snapshot_dir(&root) {
                warn!(path = %root.display(), error = %e, "could not remove snapshot directory");
            }
            if let Err(e) = self.store.delete_snapshot(snapshot_id) {
                warn!(project = %project_id, error = %e, "could not delete snapshot row");
            }
        }

        match self.store.get_project(project_id) {
            Ok(Some(mut project)) => {
                project.state = PipelineState::Error;
                project.last_error = Some(message);
                if discarded_snapshot {
                    project.active_snapshot = prior_snapshot;
                }
                if let Err(e) = self.store.save_project(&project) {
                    error!(project = %project_id, error = %e, "could not record run failure");
                }
            }
            Ok(None) => {}
            Err(e) => error!(project = %project_id, error = %e, "could not load project after failure"),
        }
    }
}

fn note(scratch: &Mutex<RunScratch>, update: impl FnOnce(&mut RunScratch)) {
    if let Ok(mut s) = scratch.lock() {
        update(&mut s);
    }
}
