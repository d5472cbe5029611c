// Error handling framework

use thiserror::Error;

/// Subprocess errors
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("Command '{command}' exited with {code:?}: {stderr}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Git repository errors
#[derive(Error, Debug)]
pub enum GitError {
    #[error("git cat-file shows checkout {0} as existing, but git checkout failed")]
    CheckoutFailedButCommitExists(String),

    #[error("Git command failed: {0}")]
    Command(#[from] CommandError),

    #[error("Invalid repository URL: {0}")]
    InvalidUrl(String),
}

/// Proof discovery and proof configuration errors
#[derive(Error, Debug)]
pub enum ProofError {
    #[error("Missing Makefile from {0}")]
    MissingMakefile(String),

    #[error("Missing {yaml_name} from {dir}")]
    MissingYaml { yaml_name: String, dir: String },

    #[error("Invalid proof configuration {path}: {reason}")]
    InvalidYaml { path: String, reason: String },

    #[error("Failed to walk {path}: {reason}")]
    Walk { path: String, reason: String },

    #[error("Filesystem error: {0}")]
    Io(String),

    #[error("Prepare script failed: {0}")]
    Command(#[from] CommandError),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid bookkeeping value in {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Filesystem error: {0}")]
    FileSystemError(String),
}

/// GitHub API errors
#[derive(Error, Debug)]
pub enum GithubError {
    #[error("GitHub request failed: {0}")]
    RequestFailed(String),

    #[error("GitHub responded with status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Failed to retrieve GitHub token: {0}")]
    TokenUnavailable(String),

    #[error("Invalid GitHub token secret: {0}")]
    InvalidTokenSecret(String),
}

/// Batch submission errors
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to submit job {job_name}: {reason}")]
    SubmitFailed { job_name: String, reason: String },

    #[error("Invalid job specification: {0}")]
    InvalidSpec(String),

    #[error("Batch returned no job id for {0}")]
    MissingJobId(String),
}

/// Errors starting the prepare build
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Failed to start build of {project}: {reason}")]
    StartFailed { project: String, reason: String },

    #[error("Invalid build environment: {0}")]
    InvalidEnvironment(String),

    #[error("CodeBuild returned no build id for {0}")]
    MissingBuildId(String),
}

/// Incoming event errors (GitHub webhooks, Batch state changes)
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Missing field in event: {0}")]
    MissingField(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Unexpected event type: {0}")]
    UnexpectedEventType(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,
}

/// Pipeline errors surfaced by the drivers
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Github(#[from] GithubError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::InvalidJson(err.to_string())
    }
}

impl From<std::io::Error> for ProofError {
    fn from(err: std::io::Error) -> Self {
        ProofError::Io(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::FileSystemError(err.to_string())
    }
}

impl From<s3::error::S3Error> for StorageError {
    fn from(err: s3::error::S3Error) -> Self {
        StorageError::ObjectStore(err.to_string())
    }
}

impl From<reqwest::Error> for GithubError {
    fn from(err: reqwest::Error) -> Self {
        GithubError::RequestFailed(err.to_string())
    }
}
