// Source preparation: clone, check out, package and launch
//
// Posts a pending status first and a final status last. Any failure becomes
// an error status for the commit before it is returned.

use crate::archive::{generate_tarfile, tarfile_key};
use crate::errors::PipelineError;
use crate::git::{
    authenticated_url, checkout_repository, clone_repository, repository_basename, CheckoutOutcome,
};
use crate::models::{CommitState, StatusUpdate};
use crate::pipeline::launch::{LaunchRequest, LaunchedJob};
use crate::pipeline::{Pipeline, CANCELLED_CONTEXT, START_CONTEXT};
use crate::proofs::run_prepare_scripts;
use std::path::PathBuf;
use tracing::{error, info, instrument};

const FAILED_TO_START_MSG: &str =
    "Failed to start proof jobs.  Likely fix: please rebase pull request against master";

/// Inputs of one preparation run
#[derive(Debug, Clone, Default)]
pub struct PrepareRequest {
    /// Clone URL (or local path) of the repository
    pub repository: String,
    pub branch: Option<String>,
    pub sha: Option<String>,
    pub is_draft: bool,
    /// GitHub repository id statuses are posted to
    pub repo_id: String,
    pub tarfile_name: String,
    /// Key prefix for the tarball in the proofs bucket
    pub tarfile_path: Option<String>,
    pub correlation_list: Vec<String>,
    pub task_id: Option<String>,
    /// Directory the clone and the tarball are created in
    pub workdir: PathBuf,
}

impl PrepareRequest {
    fn sha_or_empty(&self) -> String {
        self.sha.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// The commit is gone (or nothing was named); nothing to verify
    Cancelled,
    Launched(Vec<LaunchedJob>),
}

impl Pipeline {
    fn status(&self, request: &PrepareRequest, state: CommitState, context: &str, desc: &str) -> StatusUpdate {
        StatusUpdate::new(state, context, desc, request.repo_id.clone(), request.sha_or_empty())
    }

    #[instrument(skip_all, fields(repository = %crate::git::redact_url(&request.repository), sha = ?request.sha))]
    pub async fn source_prepare(&self, request: &PrepareRequest) -> Result<PrepareOutcome, PipelineError> {
        self.reporter
            .report(&self.status(request, CommitState::Pending, START_CONTEXT, "Status pending"))
            .await;

        match self.prepare_and_launch(request).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, "Failed to start proof jobs");
                self.reporter
                    .report(
                        &self
                            .status(request, CommitState::Error, START_CONTEXT, FAILED_TO_START_MSG)
                            .without_metric(),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn clone_url(&self, repository: &str) -> Result<String, PipelineError> {
        match &self.tokens {
            Some(tokens) if repository.starts_with("https://") => {
                let token = tokens.token().await?;
                Ok(authenticated_url(repository, &token)?)
            }
            _ => Ok(repository.to_string()),
        }
    }

    async fn prepare_and_launch(&self, request: &PrepareRequest) -> Result<PrepareOutcome, PipelineError> {
        let runner = self.runner.as_ref();
        let proofs = &self.settings.proofs;

        let base_name = repository_basename(&request.repository);
        if base_name.is_empty() {
            return Err(PipelineError::Validation(format!(
                "cannot derive a directory name from repository {}",
                request.repository
            )));
        }
        let src = request.workdir.join(&base_name);

        let url = self.clone_url(&request.repository).await?;
        clone_repository(runner, &url, &src).await?;

        let outcome = checkout_repository(
            runner,
            request.sha.as_deref(),
            request.branch.as_deref(),
            &src,
        )
        .await?;
        if matches!(outcome, CheckoutOutcome::NoTarget | CheckoutOutcome::CommitGone) {
            info!(outcome = ?outcome, "Nothing to verify");
            self.reporter
                .report(
                    &self
                        .status(
                            request,
                            CommitState::Success,
                            CANCELLED_CONTEXT,
                            "Cancelled by force-pushed commit",
                        )
                        .without_metric(),
                )
                .await;
            return Ok(PrepareOutcome::Cancelled);
        }

        run_prepare_scripts(runner, &proofs.markers, &src, &proofs.prepare_script, &proofs.python)
            .await?;

        let tarfile = request.workdir.join(&request.tarfile_name);
        generate_tarfile(runner, &tarfile, &base_name, &request.workdir).await?;
        let key = tarfile_key(request.tarfile_path.as_deref(), &request.tarfile_name);
        self.bookkeeping.upload_tarball(&tarfile, &key).await?;

        let launched = self
            .generate_cbmc_jobs(
                &src,
                &request.workdir,
                &LaunchRequest {
                    repo_id: request.repo_id.clone(),
                    sha: request.sha_or_empty(),
                    is_draft: request.is_draft,
                    tarfile_key: key,
                    correlation_list: request.correlation_list.clone(),
                    task_id: request.task_id.clone(),
                },
            )
            .await?;

        self.reporter
            .report(&self.status(
                request,
                CommitState::Success,
                START_CONTEXT,
                "Successfully started proof jobs",
            ))
            .await;
        Ok(PrepareOutcome::Launched(launched))
    }
}
