// Batch job completion: turn a finished property job into a commit status

use crate::batch::JobNameInfo;
use crate::errors::{EventError, PipelineError, StorageError};
use crate::github::StatusReporter;
use crate::models::{BatchJobEvent, CommitState, StatusUpdate};
use crate::storage::BookkeepingStore;
use serde_json::Value;
use tracing::{error, info, instrument};

const FINISHED_STATUSES: [&str; 2] = ["SUCCEEDED", "FAILED"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Not a finished CBMC property job
    Ignored,
    Reported { state: CommitState, s3_dir: String },
}

async fn verification_state(
    bookkeeping: &BookkeepingStore,
    s3_dir: &str,
) -> Result<CommitState, StorageError> {
    let expected = bookkeeping.read_expected(s3_dir).await?;
    let output = bookkeeping.read_cbmc_output(s3_dir).await?;
    if output.contains(expected.as_str()) {
        info!("Expected Verification Result: {}", s3_dir);
        Ok(CommitState::Success)
    } else {
        info!("Unexpected Verification Result: {}", s3_dir);
        Ok(CommitState::Failure)
    }
}

/// Handle one Batch "Job State Change" event
#[instrument(skip_all)]
pub async fn handle_batch_event(
    event: &Value,
    bookkeeping: &BookkeepingStore,
    reporter: &dyn StatusReporter,
) -> Result<CompletionOutcome, PipelineError> {
    info!(event = %event, "CBMC CI End Event");
    let event: BatchJobEvent =
        serde_json::from_value(event.clone()).map_err(EventError::from)?;
    let job_name = &event.detail.job_name;
    let status = &event.detail.status;

    let info = match JobNameInfo::parse(job_name) {
        Some(info) if FINISHED_STATUSES.contains(&status.as_str()) => info,
        _ => {
            info!("No action for {}: {}", job_name, status);
            return Ok(CompletionOutcome::Ignored);
        }
    };

    let mut description = format!("CBMC Batch job {} {}", info.s3_dir, status);
    let commit = bookkeeping.read_commit(&info.s3_dir).await?;

    match verification_state(bookkeeping, &info.s3_dir).await {
        Ok(state) => {
            let mut update = StatusUpdate::new(
                state,
                info.job_dir.clone(),
                description,
                commit.repo_id,
                commit.sha,
            )
            .with_job(info.s3_dir.clone());
            if commit.is_draft {
                update = update.without_metric();
            }
            reporter.report(&update).await;
            Ok(CompletionOutcome::Reported {
                state,
                s3_dir: info.s3_dir,
            })
        }
        Err(e) => {
            description.push_str(": CBMC Error");
            error!(error = %e, "{}", description);
            reporter
                .report(
                    &StatusUpdate::new(
                        CommitState::Error,
                        info.job_dir.clone(),
                        description,
                        commit.repo_id,
                        commit.sha,
                    )
                    .with_job(info.s3_dir.clone()),
                )
                .await;
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::MockStatusReporter;
    use crate::pipeline::testing::recording_reporter;
    use crate::storage::{InMemoryObjectStore, ObjectStore};
    use serde_json::json;
    use std::sync::Arc;

    const JOB: &str = "aws_array_list_get-20200102-030405";

    fn event(job_name: &str, status: &str) -> Value {
        json!({
            "detail-type": "Batch Job State Change",
            "source": "aws.batch",
            "detail": {"jobName": job_name, "jobId": "1234", "status": status}
        })
    }

    async fn store(is_draft: bool, output: Option<&str>) -> BookkeepingStore {
        let memory = InMemoryObjectStore::new("proofs");
        memory.put_object(&format!("{JOB}/repo_id.txt"), b"42").await.unwrap();
        memory.put_object(&format!("{JOB}/sha.txt"), b"abc").await.unwrap();
        memory
            .put_object(&format!("{JOB}/is_draft.txt"), is_draft.to_string().as_bytes())
            .await
            .unwrap();
        memory
            .put_object(&format!("{JOB}/expected.txt"), b"VERIFICATION SUCCESSFUL")
            .await
            .unwrap();
        if let Some(output) = output {
            memory
                .put_object(&format!("{JOB}/out/cbmc.txt"), output.as_bytes())
                .await
                .unwrap();
        }
        BookkeepingStore::new(Arc::new(memory))
    }

    #[tokio::test]
    async fn test_success() {
        let bookkeeping = store(false, Some("...\n** 0 of 12 failed\nVERIFICATION SUCCESSFUL\n")).await;
        let (reporter, posted) = recording_reporter();
        let outcome = handle_batch_event(&event(&format!("{JOB}-property"), "SUCCEEDED"), &bookkeeping, &reporter)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CompletionOutcome::Reported {
                state: CommitState::Success,
                s3_dir: JOB.to_string()
            }
        );

        let posted = posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        let update = &posted[0];
        assert_eq!(update.context, "aws_array_list_get");
        assert_eq!(update.description, format!("CBMC Batch job {JOB} SUCCEEDED"));
        assert_eq!(update.job_name.as_deref(), Some(JOB));
        assert_eq!(update.repo_id, "42");
        assert!(update.record_metric);
    }

    #[tokio::test]
    async fn test_failure_for_draft_has_no_metric() {
        let bookkeeping = store(true, Some("VERIFICATION FAILED\n")).await;
        let (reporter, posted) = recording_reporter();
        handle_batch_event(&event(&format!("{JOB}-property"), "FAILED"), &bookkeeping, &reporter)
            .await
            .unwrap();
        let posted = posted.lock().unwrap();
        assert_eq!(posted[0].state, CommitState::Failure);
        assert!(!posted[0].record_metric);
    }

    #[tokio::test]
    async fn test_missing_output_is_cbmc_error() {
        let bookkeeping = store(false, None).await;
        let (reporter, posted) = recording_reporter();
        let result =
            handle_batch_event(&event(&format!("{JOB}-property"), "FAILED"), &bookkeeping, &reporter).await;
        assert!(matches!(result, Err(PipelineError::Storage(StorageError::NotFound(_)))));

        let posted = posted.lock().unwrap();
        assert_eq!(posted[0].state, CommitState::Error);
        assert_eq!(
            posted[0].description,
            format!("CBMC Batch job {JOB} FAILED: CBMC Error")
        );
    }

    #[tokio::test]
    async fn test_ignored_events() {
        let bookkeeping = store(false, Some("")).await;
        let mut reporter = MockStatusReporter::new();
        reporter.expect_report().never();
        for (name, status) in [
            (format!("{JOB}-property"), "RUNNING"),
            (format!("{JOB}-property"), "RUNNABLE"),
            (format!("{JOB}-coverage"), "SUCCEEDED"),
            ("unrelated-job".to_string(), "FAILED"),
        ] {
            let outcome = handle_batch_event(&event(&name, status), &bookkeeping, &reporter)
                .await
                .unwrap();
            assert_eq!(outcome, CompletionOutcome::Ignored);
        }
    }

    #[tokio::test]
    async fn test_missing_bookkeeping_posts_nothing() {
        let bookkeeping = BookkeepingStore::new(Arc::new(InMemoryObjectStore::new("proofs")));
        let mut reporter = MockStatusReporter::new();
        reporter.expect_report().never();
        let result = handle_batch_event(&event(&format!("{JOB}-property"), "SUCCEEDED"), &bookkeeping, &reporter).await;
        assert!(matches!(result, Err(PipelineError::Storage(_))));
    }

    #[tokio::test]
    async fn test_malformed_event() {
        let bookkeeping = store(false, None).await;
        let reporter = MockStatusReporter::new();
        let result = handle_batch_event(&json!({"detail": {}}), &bookkeeping, &reporter).await;
        assert!(matches!(result, Err(PipelineError::Event(EventError::InvalidJson(_)))));
    }
}
