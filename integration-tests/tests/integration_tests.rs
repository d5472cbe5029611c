// End-to-end tests of the CI drivers against real git and tar
//
// Each test builds an upstream repository in a temporary directory, runs the
// prepare driver with the system command runner, and inspects what landed in
// an in-memory proofs bucket. Tests return early when git is not installed.

use async_trait::async_trait;
use common::batch::{BatchJobSpec, JobSubmitter};
use common::config::Settings;
use common::errors::BatchError;
use common::git::SystemCommandRunner;
use common::github::StatusReporter;
use common::models::{CommitState, StatusUpdate};
use common::pipeline::{
    handle_batch_event, CompletionOutcome, Pipeline, PrepareOutcome, PrepareRequest,
    CANCELLED_CONTEXT, START_CONTEXT,
};
use common::storage::{BookkeepingStore, InMemoryObjectStore, ObjectStore};
use serde_json::json;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

/// Records every status instead of posting it
#[derive(Default)]
struct RecordingReporter {
    updates: Mutex<Vec<StatusUpdate>>,
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn report(&self, update: &StatusUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }
}

impl RecordingReporter {
    fn contexts(&self) -> Vec<(CommitState, String)> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .map(|u| (u.state, u.context.clone()))
            .collect()
    }
}

/// Accepts every job and remembers its spec
#[derive(Default)]
struct RecordingSubmitter {
    specs: Mutex<Vec<BatchJobSpec>>,
}

#[async_trait]
impl JobSubmitter for RecordingSubmitter {
    async fn submit(&self, spec: &BatchJobSpec) -> Result<String, BatchError> {
        let mut specs = self.specs.lock().unwrap();
        specs.push(spec.clone());
        Ok(format!("job-{}", specs.len()))
    }
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Upstream repository with two proofs on its first commit; returns the sha
fn setup_upstream(dir: &Path) -> String {
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.email", "ci@example.com"]);
    git(dir, &["config", "user.name", "CI"]);
    for proof in ["alpha", "nested/beta"] {
        let proof_dir = dir.join("cbmc/proofs").join(proof);
        write(&proof_dir.join("Makefile"), "all:\n");
        write(
            &proof_dir.join("cbmc-batch.yaml"),
            "expected: \"VERIFICATION SUCCESSFUL\"\ngoto: harness.goto\n",
        );
    }
    write(&dir.join("src/lib.c"), "int f(void) { return 0; }\n");
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "initial"]);
    git(dir, &["rev-parse", "HEAD"])
}

struct Harness {
    pipeline: Pipeline,
    reporter: Arc<RecordingReporter>,
    submitter: Arc<RecordingSubmitter>,
    memory: InMemoryObjectStore,
    bookkeeping: BookkeepingStore,
}

fn harness() -> Harness {
    let reporter = Arc::new(RecordingReporter::default());
    let submitter = Arc::new(RecordingSubmitter::default());
    let memory = InMemoryObjectStore::new("cbmc-ci-proofs");
    let bookkeeping = BookkeepingStore::new(Arc::new(memory.clone()));
    let pipeline = Pipeline::new(
        Arc::new(Settings::default()),
        Arc::new(SystemCommandRunner),
        reporter.clone(),
        submitter.clone(),
        bookkeeping.clone(),
    );
    Harness {
        pipeline,
        reporter,
        submitter,
        memory,
        bookkeeping,
    }
}

fn request(upstream: &Path, workdir: &Path, sha: Option<String>, branch: Option<&str>) -> PrepareRequest {
    PrepareRequest {
        repository: upstream.display().to_string(),
        branch: branch.map(str::to_string),
        sha,
        is_draft: false,
        repo_id: "1234".to_string(),
        tarfile_name: "source.tar.gz".to_string(),
        tarfile_path: Some("tar".to_string()),
        correlation_list: vec!["webhook-1".to_string()],
        task_id: Some("build-7".to_string()),
        workdir: workdir.to_path_buf(),
    }
}

#[tokio::test]
async fn test_prepare_launches_every_proof() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let upstream = tempfile::tempdir().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let sha = setup_upstream(upstream.path());
    let h = harness();

    let outcome = h
        .pipeline
        .source_prepare(&request(upstream.path(), workdir.path(), Some(sha.clone()), None))
        .await
        .unwrap();

    let jobs = match outcome {
        PrepareOutcome::Launched(jobs) => jobs,
        other => panic!("unexpected outcome: {:?}", other),
    };
    let proofs: Vec<&str> = jobs.iter().map(|j| j.proof.as_str()).collect();
    assert_eq!(proofs, vec!["alpha", "beta"]);
    assert!(jobs.iter().all(|j| j.stage_jobs.len() == 4));

    assert!(workdir.path().join("source.tar.gz").is_file());
    assert!(h.memory.keys().contains(&"tar/source.tar.gz".to_string()));

    let alpha = &jobs[0].job_name;
    assert_eq!(
        h.memory.get_string(&format!("{}/sha.txt", alpha)).as_deref(),
        Some(sha.as_str())
    );
    assert_eq!(
        h.memory.get_string(&format!("{}/is_draft.txt", alpha)).as_deref(),
        Some("false")
    );
    assert_eq!(
        h.memory
            .get_string(&format!("{}/correlation_list.txt", alpha))
            .as_deref(),
        Some(r#"["webhook-1","build-7"]"#)
    );

    let specs = h.submitter.specs.lock().unwrap();
    assert_eq!(specs.len(), 8);
    let proof_dir = specs[0]
        .environment
        .iter()
        .find(|(k, _)| k == "CBMC_PROOF_DIR")
        .map(|(_, v)| v.clone())
        .unwrap();
    assert!(proof_dir.ends_with("cbmc/proofs/alpha"));
    assert!(!Path::new(&proof_dir).is_absolute());

    let contexts = h.reporter.contexts();
    assert_eq!(contexts.first(), Some(&(CommitState::Pending, START_CONTEXT.to_string())));
    assert_eq!(contexts.last(), Some(&(CommitState::Success, START_CONTEXT.to_string())));
}

#[tokio::test]
async fn test_prepare_checks_out_branch_without_sha() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let upstream = tempfile::tempdir().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    setup_upstream(upstream.path());
    git(upstream.path(), &["checkout", "-q", "-b", "feature"]);
    let proof_dir = upstream.path().join("cbmc/proofs/gamma");
    write(&proof_dir.join("Makefile"), "all:\n");
    write(&proof_dir.join("cbmc-batch.yaml"), "expected: ok\n");
    git(upstream.path(), &["add", "."]);
    git(upstream.path(), &["commit", "-q", "-m", "gamma"]);

    let h = harness();
    let outcome = h
        .pipeline
        .source_prepare(&request(upstream.path(), workdir.path(), None, Some("feature")))
        .await
        .unwrap();

    match outcome {
        PrepareOutcome::Launched(jobs) => {
            assert!(jobs.iter().any(|j| j.proof == "gamma"));
            assert_eq!(jobs.len(), 3);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_force_pushed_commit_is_cancelled() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let upstream = tempfile::tempdir().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    setup_upstream(upstream.path());
    let h = harness();

    let gone = "0123456789abcdef0123456789abcdef01234567".to_string();
    let outcome = h
        .pipeline
        .source_prepare(&request(upstream.path(), workdir.path(), Some(gone), None))
        .await
        .unwrap();

    assert_eq!(outcome, PrepareOutcome::Cancelled);
    assert!(h.memory.keys().is_empty());
    assert!(h.submitter.specs.lock().unwrap().is_empty());
    assert_eq!(
        h.reporter.contexts().last(),
        Some(&(CommitState::Success, CANCELLED_CONTEXT.to_string()))
    );
}

#[tokio::test]
async fn test_unreachable_repository_reports_error() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let missing = tempfile::tempdir().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let h = harness();

    let result = h
        .pipeline
        .source_prepare(&request(
            &missing.path().join("no-such-repo"),
            workdir.path(),
            Some("abc".to_string()),
            None,
        ))
        .await;

    assert!(result.is_err());
    assert_eq!(
        h.reporter.contexts(),
        vec![
            (CommitState::Pending, START_CONTEXT.to_string()),
            (CommitState::Error, START_CONTEXT.to_string()),
        ]
    );
}

#[tokio::test]
async fn test_completion_reports_launched_job() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let upstream = tempfile::tempdir().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let sha = setup_upstream(upstream.path());
    let h = harness();

    let jobs = match h
        .pipeline
        .source_prepare(&request(upstream.path(), workdir.path(), Some(sha.clone()), None))
        .await
        .unwrap()
    {
        PrepareOutcome::Launched(jobs) => jobs,
        other => panic!("unexpected outcome: {:?}", other),
    };

    // What the report stage would have uploaded
    let alpha = &jobs[0].job_name;
    h.memory
        .put_object(
            &format!("{}/out/cbmc.txt", alpha),
            b"...\nVERIFICATION SUCCESSFUL\n",
        )
        .await
        .unwrap();

    let completion = RecordingReporter::default();
    let event = json!({
        "detail": {"jobName": format!("{}-property", alpha), "status": "SUCCEEDED"}
    });
    let outcome = handle_batch_event(&event, &h.bookkeeping, &completion)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CompletionOutcome::Reported {
            state: CommitState::Success,
            s3_dir: alpha.clone(),
        }
    );

    let updates = completion.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].context, "alpha");
    assert_eq!(updates[0].sha, sha);
    assert_eq!(updates[0].repo_id, "1234");
    assert_eq!(updates[0].job_name.as_deref(), Some(alpha.as_str()));
}

#[tokio::test]
async fn test_packaged_clone_has_plain_remote() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let upstream = tempfile::tempdir().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let extracted = tempfile::tempdir().unwrap();
    let sha = setup_upstream(upstream.path());
    let h = harness();

    let request = request(upstream.path(), workdir.path(), Some(sha), None);
    h.pipeline.source_prepare(&request).await.unwrap();

    let status = Command::new("tar")
        .arg("xzf")
        .arg(workdir.path().join("source.tar.gz"))
        .arg("-C")
        .arg(extracted.path())
        .status()
        .unwrap();
    assert!(status.success());

    let base = common::git::repository_basename(&request.repository);
    let git_config =
        std::fs::read_to_string(extracted.path().join(base).join(".git/config")).unwrap();
    let remote_url = git_config
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("url = "))
        .unwrap();
    assert_eq!(remote_url, request.repository);
    assert_eq!(common::git::strip_credentials(remote_url), remote_url);
}
