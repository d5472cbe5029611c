// Stage pipeline submission to AWS Batch

use crate::batch::naming::{stage_job_name, BUILD_STAGE, REPORT_STAGE};
use crate::errors::BatchError;
use crate::models::ProofConfig;
use async_trait::async_trait;
use aws_sdk_batch::error::DisplayErrorContext;
use aws_sdk_batch::types::{ContainerOverrides, JobDependency, KeyValuePair};
use tracing::{info, instrument};

#[cfg(test)]
use mockall::automock;

const MAX_JOB_NAME_LEN: usize = 128;

/// One job to submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJobSpec {
    pub job_name: String,
    /// Job ids this job waits for
    pub depends_on: Vec<String>,
    /// Container environment overrides
    pub environment: Vec<(String, String)>,
}

impl BatchJobSpec {
    /// Batch accepts up to 128 letters, digits, hyphens and underscores
    pub fn validate(&self) -> Result<(), BatchError> {
        let name = &self.job_name;
        if name.is_empty() || name.len() > MAX_JOB_NAME_LEN {
            return Err(BatchError::InvalidSpec(format!(
                "job name must be 1-{} characters: {}",
                MAX_JOB_NAME_LEN, name
            )));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(BatchError::InvalidSpec(format!(
                "job name {} contains '{}'",
                name, c
            )));
        }
        Ok(())
    }
}

/// Submits jobs to the batch service and returns their ids
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(&self, spec: &BatchJobSpec) -> Result<String, BatchError>;
}

/// Everything the container of each stage needs to find its work
#[derive(Debug, Clone)]
pub struct JobLaunch<'a> {
    pub job_name: &'a str,
    pub task_name: &'a str,
    /// Proof directory relative to the source tree root
    pub proof_dir: &'a str,
    pub bucket: &'a str,
    pub tarfile_key: &'a str,
    pub config: &'a ProofConfig,
}

impl JobLaunch<'_> {
    pub fn environment(&self, stage: &str) -> Vec<(String, String)> {
        let mut env = vec![
            ("CBMC_JOB_NAME", self.job_name.to_string()),
            ("CBMC_TASK_NAME", self.task_name.to_string()),
            ("CBMC_STAGE", stage.to_string()),
            ("CBMC_PROOF_DIR", self.proof_dir.to_string()),
            (
                "CBMC_SRC_TARFILE",
                format!("s3://{}/{}", self.bucket, self.tarfile_key),
            ),
            ("CBMC_BUCKET", self.bucket.to_string()),
            ("CBMC_OUTPUT_PREFIX", format!("{}/out", self.job_name)),
            ("CBMC_EXPECTED", self.config.expected.clone()),
        ];
        let optional = [
            ("CBMC_GOTO", &self.config.goto),
            ("CBMC_FLAGS", &self.config.cbmcflags),
            ("CBMC_JOBOS", &self.config.jobos),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                env.push((name, value.clone()));
            }
        }
        env.into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}

/// Submit one job per stage. The build stage goes first and every other
/// stage waits for it; the report stage waits for every earlier stage.
///
/// Returns the `(stage job name, job id)` pairs in submission order.
#[instrument(skip(submitter, launch, stages), fields(job = %launch.job_name))]
pub async fn submit_pipeline(
    submitter: &dyn JobSubmitter,
    launch: &JobLaunch<'_>,
    stages: &[String],
) -> Result<Vec<(String, String)>, BatchError> {
    let mut ordered: Vec<&str> = stages.iter().map(String::as_str).collect();
    if let Some(pos) = ordered.iter().position(|s| *s == BUILD_STAGE) {
        let build = ordered.remove(pos);
        ordered.insert(0, build);
    }

    let mut submitted: Vec<(String, String)> = Vec::with_capacity(ordered.len());
    let mut build_id: Option<String> = None;
    for stage in ordered {
        let depends_on = match stage {
            BUILD_STAGE => Vec::new(),
            REPORT_STAGE => submitted.iter().map(|(_, id)| id.clone()).collect(),
            _ => build_id.iter().cloned().collect(),
        };
        let spec = BatchJobSpec {
            job_name: stage_job_name(launch.job_name, stage),
            depends_on,
            environment: launch.environment(stage),
        };
        spec.validate()?;
        let job_id = submitter.submit(&spec).await?;
        info!(stage_job = %spec.job_name, job_id = %job_id, "Submitted stage job");
        if stage == BUILD_STAGE {
            build_id = Some(job_id.clone());
        }
        submitted.push((spec.job_name, job_id));
    }
    Ok(submitted)
}

/// `JobSubmitter` backed by the AWS Batch `SubmitJob` API
#[derive(Debug, Clone)]
pub struct AwsBatchSubmitter {
    client: aws_sdk_batch::Client,
    job_queue: String,
    job_definition: String,
}

impl AwsBatchSubmitter {
    pub fn new(
        client: aws_sdk_batch::Client,
        job_queue: impl Into<String>,
        job_definition: impl Into<String>,
    ) -> Self {
        Self {
            client,
            job_queue: job_queue.into(),
            job_definition: job_definition.into(),
        }
    }
}

#[async_trait]
impl JobSubmitter for AwsBatchSubmitter {
    #[instrument(skip_all, fields(job_name = %spec.job_name, queue = %self.job_queue))]
    async fn submit(&self, spec: &BatchJobSpec) -> Result<String, BatchError> {
        let mut overrides = ContainerOverrides::builder();
        for (name, value) in &spec.environment {
            overrides = overrides.environment(KeyValuePair::builder().name(name).value(value).build());
        }

        let mut request = self
            .client
            .submit_job()
            .job_name(&spec.job_name)
            .job_queue(&self.job_queue)
            .job_definition(&self.job_definition)
            .container_overrides(overrides.build());
        for job_id in &spec.depends_on {
            request = request.depends_on(JobDependency::builder().job_id(job_id).build());
        }

        let output = request.send().await.map_err(|e| BatchError::SubmitFailed {
            job_name: spec.job_name.clone(),
            reason: DisplayErrorContext(&e).to_string(),
        })?;
        job_id_of(output.job_id(), &spec.job_name)
    }
}

fn job_id_of(job_id: Option<&str>, job_name: &str) -> Result<String, BatchError> {
    job_id
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BatchError::MissingJobId(job_name.to_string()))
}
