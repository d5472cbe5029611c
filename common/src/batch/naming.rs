// Batch job names
//
// A launch is named `<task>-YYYYMMDD-HHMMSS`; each stage job appends
// `-<stage>`. The completion handler recovers the launch name and the proof
// name from a finished property job.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

pub const PROPERTY_STAGE: &str = "property";
pub const BUILD_STAGE: &str = "build";
pub const REPORT_STAGE: &str = "report";

static PROPERTY_JOB_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)(\S{16})-property$").expect("Invalid regex pattern"));

/// `<task>-YYYYMMDD-HHMMSS` in UTC
pub fn job_name(task: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", task, now.format("%Y%m%d-%H%M%S"))
}

/// `<job>-<stage>`
pub fn stage_job_name(job_name: &str, stage: &str) -> String {
    format!("{}-{}", job_name, stage)
}

/// What a finished property job's name says about its launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobNameInfo {
    /// Launch name; bookkeeping and output live under this prefix
    pub s3_dir: String,
    /// Proof name; used as the status context
    pub job_dir: String,
}

impl JobNameInfo {
    /// Parse a Batch job name. Returns None for anything that is not a
    /// CBMC property job.
    pub fn parse(name: &str) -> Option<Self> {
        let captures = PROPERTY_JOB_NAME.captures(name)?;
        let job_dir = captures.get(1)?.as_str();
        let timestamp = captures.get(2)?.as_str();
        Some(Self {
            s3_dir: format!("{}{}", job_dir, timestamp),
            job_dir: job_dir.to_string(),
        })
    }
}
