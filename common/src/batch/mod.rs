// AWS Batch job naming and submission

pub mod naming;
pub mod submitter;

pub use naming::{job_name, stage_job_name, JobNameInfo, PROPERTY_STAGE};
pub use submitter::{submit_pipeline, AwsBatchSubmitter, BatchJobSpec, JobLaunch, JobSubmitter};

#[cfg(test)]
pub use submitter::MockJobSubmitter;
