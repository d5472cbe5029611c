use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Commit statuses
// ============================================================================

/// GitHub commit status state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Failure,
    Error,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Failure => "failure",
            CommitState::Error => "error",
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A commit status to be posted for one commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub state: CommitState,
    /// Context without the configured prefix (a proof name, or a pipeline phase)
    pub context: String,
    pub description: String,
    /// Batch job whose output folder the status links to
    pub job_name: Option<String>,
    pub repo_id: String,
    pub sha: String,
    /// Whether the per-state metric is recorded for this update
    pub record_metric: bool,
}

impl StatusUpdate {
    pub fn new(
        state: CommitState,
        context: impl Into<String>,
        description: impl Into<String>,
        repo_id: impl Into<String>,
        sha: impl Into<String>,
    ) -> Self {
        Self {
            state,
            context: context.into(),
            description: description.into(),
            job_name: None,
            repo_id: repo_id.into(),
            sha: sha.into(),
            record_metric: true,
        }
    }

    pub fn with_job(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = Some(job_name.into());
        self
    }

    pub fn without_metric(mut self) -> Self {
        self.record_metric = false;
        self
    }
}

// ============================================================================
// Proofs
// ============================================================================

/// A discovered proof: its name and the directory holding its Makefile and YAML
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProofTask {
    pub name: String,
    pub dir: PathBuf,
}

/// Parsed proof YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofConfig {
    /// Substring the CBMC output must contain for the proof to pass
    #[serde(default)]
    pub expected: String,
    #[serde(default)]
    pub goto: Option<String>,
    #[serde(default)]
    pub cbmcflags: Option<String>,
    #[serde(default)]
    pub jobos: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

// ============================================================================
// Bookkeeping
// ============================================================================

/// What the completion handler needs to know about a launched job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookkeeping {
    pub repo_id: String,
    pub sha: String,
    pub is_draft: bool,
    pub expected: String,
    #[serde(default)]
    pub correlation_list: Vec<String>,
}

// ============================================================================
// Events
// ============================================================================

/// The `detail` of an AWS Batch "Job State Change" event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJobDetail {
    #[serde(rename = "jobName")]
    pub job_name: String,
    pub status: String,
    #[serde(rename = "jobId", default)]
    pub job_id: Option<String>,
}

/// AWS Batch state change event as delivered by EventBridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJobEvent {
    pub detail: BatchJobDetail,
}

/// The commit a GitHub event asks the CI to verify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRequest {
    /// `owner/name` of the repository statuses are posted to
    pub full_name: String,
    pub clone_url: String,
    pub repo_id: String,
    pub branch: String,
    pub sha: String,
    pub is_draft: bool,
}
