// Proof launch: one stage pipeline per discovered proof

use crate::batch::{job_name, submit_pipeline, JobLaunch};
use crate::errors::PipelineError;
use crate::models::{Bookkeeping, CommitState, ProofTask, StatusUpdate};
use crate::pipeline::Pipeline;
use crate::proofs::{find_tasks, load_proof_config};
use chrono::Utc;
use std::path::Path;
use tracing::{error, info, instrument};

/// Commit and tarball every job of one launch shares
#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    pub repo_id: String,
    pub sha: String,
    pub is_draft: bool,
    /// Key of the source tarball in the proofs bucket
    pub tarfile_key: String,
    /// Correlation ids of the invocation that triggered this launch
    pub correlation_list: Vec<String>,
    /// Id of this invocation (the CodeBuild build id)
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedJob {
    pub proof: String,
    pub job_name: String,
    /// `(stage job name, job id)` in submission order
    pub stage_jobs: Vec<(String, String)>,
}

/// Correlation list handed to a child job: the parent's list plus the
/// parent's own id
pub fn child_correlation_list(parent: &[String], task_id: Option<&str>) -> Vec<String> {
    let mut list = parent.to_vec();
    if let Some(id) = task_id.filter(|id| !id.is_empty()) {
        list.push(id.to_string());
    }
    list
}

impl Pipeline {
    /// Launch every proof found under `src`
    ///
    /// A proof that fails to launch gets an error status and the loop moves
    /// on; the last failure is returned once every proof was attempted.
    /// `archive_root` is the directory the source tarball was created from.
    #[instrument(skip(self, request), fields(src = %src.display(), sha = %request.sha))]
    pub async fn generate_cbmc_jobs(
        &self,
        src: &Path,
        archive_root: &Path,
        request: &LaunchRequest,
    ) -> Result<Vec<LaunchedJob>, PipelineError> {
        let proofs = &self.settings.proofs;
        let tasks = find_tasks(&proofs.markers, &proofs.yaml_name, src)?;

        let mut launched = Vec::with_capacity(tasks.len());
        let mut pending_error = None;
        for task in &tasks {
            match self.launch_task(task, archive_root, request).await {
                Ok(job) => launched.push(job),
                Err(e) => {
                    error!(proof = %task.name, error = %e, "Problem launching verification");
                    self.reporter
                        .report(&StatusUpdate::new(
                            CommitState::Error,
                            task.name.clone(),
                            "Problem launching verification",
                            request.repo_id.clone(),
                            request.sha.clone(),
                        ))
                        .await;
                    pending_error = Some(e);
                }
            }
        }

        match pending_error {
            Some(e) => Err(e),
            None => Ok(launched),
        }
    }

    async fn launch_task(
        &self,
        task: &ProofTask,
        archive_root: &Path,
        request: &LaunchRequest,
    ) -> Result<LaunchedJob, PipelineError> {
        let config = load_proof_config(&task.dir, &self.settings.proofs.yaml_name)?;
        let job_name = job_name(&task.name, Utc::now());
        let proof_dir = task
            .dir
            .strip_prefix(archive_root)
            .unwrap_or(task.dir.as_path())
            .to_string_lossy()
            .into_owned();

        let launch = JobLaunch {
            job_name: &job_name,
            task_name: &task.name,
            proof_dir: &proof_dir,
            bucket: self.bookkeeping.bucket_name(),
            tarfile_key: &request.tarfile_key,
            config: &config,
        };
        let stage_jobs =
            submit_pipeline(self.submitter.as_ref(), &launch, &self.settings.batch.stages).await?;

        let correlation_list =
            child_correlation_list(&request.correlation_list, request.task_id.as_deref());
        info!(child = %job_name, correlation_list = ?correlation_list, "Launched child job");

        self.bookkeeping
            .write(
                &job_name,
                &Bookkeeping {
                    repo_id: request.repo_id.clone(),
                    sha: request.sha.clone(),
                    is_draft: request.is_draft,
                    expected: config.expected.clone(),
                    correlation_list,
                },
            )
            .await?;

        self.reporter
            .report(
                &StatusUpdate::new(
                    CommitState::Pending,
                    task.name.clone(),
                    format!("Verification Pending: CBMC Batch job {}", job_name),
                    request.repo_id.clone(),
                    request.sha.clone(),
                )
                .with_job(job_name.clone()),
            )
            .await;

        Ok(LaunchedJob {
            proof: task.name.clone(),
            job_name,
            stage_jobs,
        })
    }
}
