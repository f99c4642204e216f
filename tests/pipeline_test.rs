mod common;

use archintel::edge::{EdgeKind, EdgeTarget, ResolutionTier};
use archintel::model::{DocumentKind, DocumentTarget, ParseStatus};
use archintel::pipeline::{DocumentLookup, PipelineState, StartOutcome};
use archintel::query::AskOutcome;
use archintel::{Error, SymbolKind, ValidationError};
use common::{Harness, LOCATION, harness, harness_with, snapshot_dirs};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const A_PY: &str = "def f():\n    \"\"\"Return the answer.\"\"\"\n    return 42\n";
const B_PY: &str = "from a import f\n\n\ndef use_f():\n    return f()\n";
const WAIT: Duration = Duration::from_secs(30);

async fn doc_version(h: &Harness, project: uuid::Uuid, path: &str) -> u64 {
    let target = DocumentTarget::File(path.into());
    match h.orchestrator.get_document(project, &target, DocumentKind::Summary).await.unwrap() {
        DocumentLookup::Found(doc) => doc.version,
        DocumentLookup::NotYetGenerated => panic!("no document for {path}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingest_resolves_cross_file_import() {
    let h = harness(&[("a.py", A_PY), ("b.py", B_PY)]);
    let project = h.orchestrator.register_project(LOCATION, None).unwrap();
    h.orchestrator.start_pipeline(project.id).unwrap();

    let status = h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();
    assert_eq!(status.state, PipelineState::Ready);
    assert_eq!(status.last_graph_version, Some(1));
    assert!(status.last_error.is_none());

    let version = h.orchestrator.published_version(project.id).unwrap().unwrap();
    let import = version
        .graph
        .all_edges()
        .iter()
        .find(|e| e.kind == EdgeKind::Imports && e.name == "f")
        .expect("import edge");
    assert_eq!(import.from_uri.kind, SymbolKind::Module);
    assert_eq!(import.from_uri.path, "b.py");
    match &import.target {
        EdgeTarget::Resolved { uri, tier } => {
            assert_eq!(uri.path, "a.py");
            assert_eq!(uri.name, "f");
            assert_eq!(*tier, ResolutionTier::SameDirectory);
        }
        other => panic!("import not resolved: {other:?}"),
    }

    let structure = h.orchestrator.get_structure(project.id).unwrap();
    let paths: Vec<&str> = structure.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["a.py", "b.py"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unchanged_sources_rebuild_to_identical_edges() {
    let h = harness(&[("a.py", A_PY), ("b.py", B_PY), ("README.md", "# shop\n")]);
    let project = h.orchestrator.register_project(LOCATION, None).unwrap();
    h.orchestrator.start_pipeline(project.id).unwrap();
    h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();
    let v1 = h.orchestrator.published_version(project.id).unwrap().unwrap();

    // non-source change: new snapshot, same graph
    h.fetcher.write("README.md", "# shop\n\nNow with docs.\n");
    h.orchestrator.start_pipeline(project.id).unwrap();
    h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();
    let v2 = h.orchestrator.published_version(project.id).unwrap().unwrap();

    assert_eq!(v2.version, 2);
    assert_eq!(v1.fingerprint, v2.fingerprint);
    let lines = |v: &archintel::GraphVersion| v.graph.all_edges().iter().map(|e| e.canonical_line()).collect::<Vec<_>>();
    assert_eq!(lines(&v1), lines(&v2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn identical_snapshot_keeps_published_version() {
    let h = harness(&[("a.py", A_PY)]);
    let project = h.orchestrator.register_project(LOCATION, None).unwrap();
    h.orchestrator.start_pipeline(project.id).unwrap();
    h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();
    let calls = h.model.calls();

    h.orchestrator.start_pipeline(project.id).unwrap();
    let status = h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();

    assert_eq!(status.state, PipelineState::Ready);
    assert_eq!(status.last_graph_version, Some(1));
    assert_eq!(h.fetcher.fetch_count(), 2);
    assert_eq!(h.model.calls(), calls);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resync_regenerates_only_the_edited_file() {
    let h = harness(&[("a.py", A_PY), ("b.py", B_PY)]);
    let project = h.orchestrator.register_project(LOCATION, None).unwrap();
    h.orchestrator.start_pipeline(project.id).unwrap();
    h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();
    let calls = h.model.calls();

    h.fetcher.write("a.py", "def f():\n    \"\"\"Return the answer.\"\"\"\n    return 43\n");
    h.orchestrator.start_pipeline(project.id).unwrap();
    h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();

    assert_eq!(doc_version(&h, project.id, "a.py").await, 2);
    assert_eq!(doc_version(&h, project.id, "b.py").await, 1);
    // a.py and the project summary
    assert_eq!(h.model.calls() - calls, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_file_does_not_stop_ingestion() {
    let h = harness(&[("a.py", A_PY), ("broken.py", "def broken(:\n    pass\n")]);
    let project = h.orchestrator.register_project(LOCATION, None).unwrap();
    h.orchestrator.start_pipeline(project.id).unwrap();
    let status = h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();
    assert_eq!(status.state, PipelineState::Ready);

    let version = h.orchestrator.published_version(project.id).unwrap().unwrap();
    assert_eq!(version.file("a.py").unwrap().status, ParseStatus::Ok);
    let broken = version.file("broken.py").unwrap();
    assert_eq!(broken.status, ParseStatus::Failed);
    assert!(broken.reason.is_some());
    assert!(version.graph.symbols_in_file("broken.py").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unrelated_question_gets_no_context() {
    let h = harness(&[("a.py", A_PY), ("b.py", B_PY)]);
    let project = h.orchestrator.register_project(LOCATION, None).unwrap();
    h.orchestrator.start_pipeline(project.id).unwrap();
    h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();
    let calls = h.model.calls();

    let outcome = h.orchestrator.ask(project.id, "Where is the billing queue?").await.unwrap();
    assert!(matches!(outcome, AskOutcome::NoContext { version: 1 }));
    assert_eq!(h.model.calls(), calls);

    let outcome = h.orchestrator.ask(project.id, "What does use_f return?").await.unwrap();
    let AskOutcome::Answered(answer) = outcome else { panic!("expected an answer") };
    assert!(answer.citations.iter().any(|c| c.qualified_name == "use_f" && c.path == "b.py"));
    assert_eq!(h.model.calls(), calls + 1);
}

#[tokio::test]
async fn shell_metacharacter_location_is_rejected_before_fetch() {
    let h = harness(&[("a.py", A_PY)]);
    let err = h.orchestrator.register_project("; rm -rf /", None).unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::ForbiddenPattern(_))));
    assert_eq!(h.fetcher.fetch_count(), 0);
    assert!(h.orchestrator.list_projects().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_run_per_project_and_reads_see_the_prior_version() {
    let gate = Arc::new(Semaphore::new(1));
    let h = harness_with(&[("a.py", A_PY)], |_| {}, Some(gate.clone()));
    let project = h.orchestrator.register_project(LOCATION, None).unwrap();
    h.orchestrator.start_pipeline(project.id).unwrap();
    h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();

    h.fetcher.write("a.py", "def f():\n    return 1\n\ndef g():\n    return f()\n");
    let first = h.orchestrator.start_pipeline(project.id).unwrap();
    let second = h.orchestrator.start_pipeline(project.id).unwrap();
    let StartOutcome::Started(run) = first else { panic!("first start should queue a run") };
    assert_eq!(second, StartOutcome::AlreadyRunning(run));
    assert_eq!(h.orchestrator.get_status(project.id).unwrap().run_id, Some(run));

    // the run is parked in fetch; readers keep version 1
    let structure = h.orchestrator.get_structure(project.id).unwrap();
    assert_eq!(structure.version, 1);
    assert!(matches!(h.orchestrator.ask(project.id, "what does the answer return").await.unwrap(), AskOutcome::Answered(a) if a.version == 1));

    gate.add_permits(1);
    let status = h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();
    assert_eq!(status.last_graph_version, Some(2));
    assert_eq!(h.orchestrator.get_structure(project.id).unwrap().version, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_fetch_keeps_prior_version_published() {
    let h = harness(&[("a.py", A_PY)]);
    let project = h.orchestrator.register_project(LOCATION, None).unwrap();
    h.orchestrator.start_pipeline(project.id).unwrap();
    h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();

    h.fetcher.fail("repository not found");
    h.orchestrator.start_pipeline(project.id).unwrap();
    let status = h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();

    assert_eq!(status.state, PipelineState::Error);
    assert!(status.last_error.unwrap().contains("repository not found"));
    assert_eq!(status.last_graph_version, Some(1));
    assert_eq!(h.orchestrator.get_structure(project.id).unwrap().version, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_timeout_moves_project_to_error() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness_with(&[("a.py", A_PY)], |c| c.pipeline.run_timeout_secs = 1, Some(gate));
    let project = h.orchestrator.register_project(LOCATION, None).unwrap();
    h.orchestrator.start_pipeline(project.id).unwrap();

    let status = h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();
    assert_eq!(status.state, PipelineState::Error);
    assert!(status.last_error.unwrap().contains("1 second limit"));
    assert_eq!(status.last_graph_version, None);
    assert!(matches!(h.orchestrator.get_structure(project.id), Err(Error::NoPublishedGraph(_))));
}

#[tokio::test]
async fn unknown_project_is_reported() {
    let h = harness(&[]);
    let missing = uuid::Uuid::new_v4();
    assert!(matches!(h.orchestrator.start_pipeline(missing), Err(Error::ProjectNotFound(id)) if id == missing));
    assert!(matches!(h.orchestrator.get_status(missing), Err(Error::ProjectNotFound(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_during_synthesis_leaves_no_version_or_documents() {
    let h = harness_with(&[("a.py", A_PY), ("b.py", B_PY)], |c| c.pipeline.run_timeout_secs = 1, None);
    h.model.stall();
    let project = h.orchestrator.register_project(LOCATION, None).unwrap();
    h.orchestrator.start_pipeline(project.id).unwrap();

    let status = h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();
    assert_eq!(status.state, PipelineState::Error);
    assert_eq!(status.last_graph_version, None);
    assert!(h.model.calls() > 0);

    // let the cut-off model call finish before looking at the store
    tokio::time::sleep(common::STALL + Duration::from_secs(1)).await;
    assert!(h.orchestrator.store().list_versions(project.id).unwrap().is_empty());
    let lookup = h.orchestrator.get_document(project.id, &DocumentTarget::File("a.py".into()), DocumentKind::Summary).await.unwrap();
    assert!(matches!(lookup, DocumentLookup::NotYetGenerated));
    assert_eq!(snapshot_dirs(&h.dir.path().join("workspace"), project.id), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn module_document_is_generated_on_request() {
    let h = harness(&[("a.py", A_PY), ("b.py", B_PY)]);
    let project = h.orchestrator.register_project(LOCATION, None).unwrap();
    h.orchestrator.start_pipeline(project.id).unwrap();
    h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();
    let calls = h.model.calls();

    let target = DocumentTarget::Module("a".into());
    let DocumentLookup::Found(doc) = h.orchestrator.get_document(project.id, &target, DocumentKind::Summary).await.unwrap() else {
        panic!("module document was not generated");
    };
    assert_eq!(doc.version, 1);
    assert_eq!(h.model.calls(), calls + 1);

    // served from the store the second time
    let again = h.orchestrator.get_document(project.id, &target, DocumentKind::Summary).await.unwrap();
    assert!(matches!(again, DocumentLookup::Found(d) if d.created_at == doc.created_at));
    assert_eq!(h.model.calls(), calls + 1);

    let unknown = DocumentTarget::Module("nowhere".into());
    let lookup = h.orchestrator.get_document(project.id, &unknown, DocumentKind::Summary).await.unwrap();
    assert!(matches!(lookup, DocumentLookup::NotYetGenerated));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resyncs_collect_old_snapshot_directories() {
    let h = harness_with(&[("a.py", A_PY)], |c| c.storage.keep_versions = 1, None);
    let workspace = h.dir.path().join("workspace");
    let project = h.orchestrator.register_project(LOCATION, None).unwrap();

    for answer in 1..=4 {
        h.fetcher.write("a.py", &format!("def f():\n    return {answer}\n"));
        h.orchestrator.start_pipeline(project.id).unwrap();
        let status = h.orchestrator.wait_for_run(project.id, WAIT).await.unwrap();
        assert_eq!(status.last_graph_version, Some(answer));
    }

    assert_eq!(h.orchestrator.store().list_versions(project.id).unwrap(), vec![4]);
    assert_eq!(snapshot_dirs(&workspace, project.id), 1);
}
