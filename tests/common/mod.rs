//! Shared stubs for integration tests: an in-memory fetcher and a counting model.

#![allow(dead_code)]

use archintel::config::Config;
use archintel::fetch::snapshot::capture;
use archintel::fetch::{FetchRequest, RepositoryFetcher};
use archintel::model::Snapshot;
use archintel::provider::{LanguageModel, Prompt};
use archintel::{FetchError, Orchestrator, ProviderError, SqliteStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Semaphore;

pub const LOCATION: &str = "https://github.com/acme/shop";

/// Writes the current file set into a fresh snapshot directory on every fetch.
pub struct StubFetcher {
    workspace: PathBuf,
    files: Mutex<BTreeMap<String, String>>,
    fail_with: Mutex<Option<String>>,
    /// When set, each fetch waits for one permit
    gate: Option<Arc<Semaphore>>,
    pub fetches: AtomicUsize,
}

impl StubFetcher {
    pub fn new(workspace: PathBuf, files: &[(&str, &str)]) -> Self {
        Self {
            workspace,
            files: Mutex::new(files.iter().map(|(p, s)| (p.to_string(), s.to_string())).collect()),
            fail_with: Mutex::new(None),
            gate: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn write(&self, path: &str, source: &str) {
        self.files.lock().unwrap().insert(path.to_string(), source.to_string());
    }

    pub fn fail(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryFetcher for StubFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Snapshot, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.map_err(|e| FetchError::Permanent(e.to_string()))?.forget();
        }
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(FetchError::Permanent(message));
        }

        let root = self.workspace.join(request.project_id.to_string()).join(request.snapshot_id.to_string());
        let files = self.files.lock().unwrap().clone();
        for (path, source) in &files {
            let full = root.join(path);
            std::fs::create_dir_all(full.parent().unwrap())?;
            std::fs::write(full, source)?;
        }
        Ok(capture(request.snapshot_id, request.project_id, root, None, &[])?)
    }
}

/// Answers with a fixed text and counts calls.
pub struct CountingModel {
    pub calls: AtomicUsize,
    /// When set, every call sleeps for `STALL` before answering
    stalled: AtomicBool,
}

pub const STALL: std::time::Duration = std::time::Duration::from_secs(5);

impl CountingModel {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0), stalled: AtomicBool::new(false) }
    }

    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for CountingModel {
    fn name(&self) -> &str {
        "counting"
    }

    fn input_budget(&self) -> usize {
        100_000
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(STALL).await;
        }
        let first = prompt.user.lines().next().unwrap_or_default();
        Ok(format!("Answer for: {first}"))
    }
}

pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.database = dir.path().join("archintel.db");
    config.workspace.dir = dir.path().join("workspace");
    config.pipeline.workers = 2;
    config.synthesis.backoff_base_ms = 1;
    config.synthesis.backoff_max_ms = 2;
    config
}

pub struct Harness {
    pub dir: TempDir,
    pub orchestrator: Orchestrator,
    pub fetcher: Arc<StubFetcher>,
    pub model: Arc<CountingModel>,
}

pub fn harness_with(files: &[(&str, &str)], adjust: impl FnOnce(&mut Config), gate: Option<Arc<Semaphore>>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    adjust(&mut config);

    let mut fetcher = StubFetcher::new(config.workspace.dir.clone(), files);
    if let Some(gate) = gate {
        fetcher = fetcher.gated(gate);
    }
    let fetcher = Arc::new(fetcher);
    let model = Arc::new(CountingModel::new());
    let store = Arc::new(SqliteStore::open(&config.storage.database).unwrap());
    let orchestrator = Orchestrator::new(store, fetcher.clone(), model.clone(), &config);
    Harness { dir, orchestrator, fetcher, model }
}

pub fn harness(files: &[(&str, &str)]) -> Harness {
    harness_with(files, |_| {}, None)
}

/// Snapshot directories currently on disk for a project.
pub fn snapshot_dirs(workspace: &Path, project: uuid::Uuid) -> usize {
    match std::fs::read_dir(workspace.join(project.to_string())) {
        Ok(entries) => entries.filter_map(|e| e.ok()).filter(|e| e.path().is_dir()).count(),
        Err(_) => 0,
    }
}
