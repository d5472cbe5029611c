// Command line of cbmc-ci-prepare
//
// Every option also reads the variable the CodeBuild project exports. An
// empty variable counts as unset.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use common::archive::make_tarfile_name;
use common::config::Settings;
use common::pipeline::PrepareRequest;
use std::path::PathBuf;

/// Clone a repository, package it and launch its CBMC proofs on AWS Batch
#[derive(Parser, Debug, Clone)]
#[command(name = "cbmc-ci-prepare")]
#[command(version)]
pub struct Cli {
    /// AWS profile for S3, Batch and Secrets Manager
    #[arg(long)]
    pub profile: Option<String>,

    /// Repository clone URL
    #[arg(long, env = "CBMC_REPOSITORY")]
    pub repository: Option<String>,

    /// Branch to check out when no sha is given
    #[arg(long, env = "CBMC_BRANCH")]
    pub branch: Option<String>,

    /// Commit to check out and verify
    #[arg(long, env = "CBMC_SHA")]
    pub sha: Option<String>,

    /// The commit belongs to a draft pull request (also CBMC_IS_DRAFT=true)
    #[arg(long)]
    pub is_draft: bool,

    /// GitHub repository id
    #[arg(long, env = "CBMC_ID")]
    pub id: Option<String>,

    /// Bucket holding the CI tools (accepted for compatibility, unused)
    #[arg(long, env = "S3_BUCKET_TOOLS")]
    pub bucket_tools: Option<String>,

    /// Bucket for source tarballs, bookkeeping and proof output
    #[arg(long, env = "S3_BUCKET_PROOFS")]
    pub bucket_proofs: Option<String>,

    /// Key prefix for the source tarball
    #[arg(long, env = "S3_TAR_PATH")]
    pub tarfile_path: Option<String>,

    /// Name of the source tarball [default: <owner>-<repo>-<timestamp>[-<sha>].tar.gz]
    #[arg(long)]
    pub tarfile_name: Option<String>,

    /// Logging level
    #[arg(long, default_value = "INFO")]
    pub logging: String,

    /// JSON list of correlation ids of the triggering invocation
    #[arg(long, env = "CORRELATION_LIST")]
    pub correlation_list: Option<String>,

    /// Id of this invocation
    #[arg(long, env = "CODEBUILD_BUILD_ID")]
    pub task_id: Option<String>,

    /// Directory the repository is cloned into
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Directory holding default.toml / local.toml
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `--is-draft`, or CBMC_IS_DRAFT set to "true" in any case
pub fn resolve_is_draft<F>(flag: bool, lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    flag || lookup("CBMC_IS_DRAFT")
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn parse_correlation_list(raw: Option<&str>) -> Result<Vec<String>> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => serde_json::from_str(raw)
            .with_context(|| format!("Invalid correlation list: {}", raw)),
        None => Ok(Vec::new()),
    }
}

impl Cli {
    /// Command line values override the configuration files
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(bucket) = non_empty(&self.bucket_proofs) {
            settings.aws.proofs_bucket = bucket;
        }
        if let Some(bucket) = non_empty(&self.bucket_tools) {
            settings.aws.tools_bucket = Some(bucket);
        }
        if let Some(path) = non_empty(&self.tarfile_path) {
            settings.aws.tar_path = Some(path);
        }
        if let Some(profile) = non_empty(&self.profile) {
            settings.aws.profile = Some(profile);
        }
        settings.observability.log_level = self.logging.to_lowercase();
    }

    pub fn prepare_request<F>(
        &self,
        settings: &Settings,
        now: DateTime<Utc>,
        lookup: F,
    ) -> Result<PrepareRequest>
    where
        F: Fn(&str) -> Option<String>,
    {
        let repository = non_empty(&self.repository)
            .context("A repository is required (--repository or CBMC_REPOSITORY)")?;
        let sha = non_empty(&self.sha);
        let tarfile_name = non_empty(&self.tarfile_name)
            .unwrap_or_else(|| make_tarfile_name(&repository, sha.as_deref(), now));
        let workdir = if self.workdir.is_absolute() {
            self.workdir.clone()
        } else {
            std::env::current_dir()
                .context("Failed to read the current directory")?
                .join(&self.workdir)
        };

        Ok(PrepareRequest {
            branch: non_empty(&self.branch),
            sha,
            is_draft: resolve_is_draft(self.is_draft, lookup),
            repo_id: non_empty(&self.id).unwrap_or_default(),
            tarfile_name,
            tarfile_path: settings.aws.tar_path.clone(),
            correlation_list: parse_correlation_list(self.correlation_list.as_deref())?,
            task_id: non_empty(&self.task_id),
            workdir,
            repository,
        })
    }
}
