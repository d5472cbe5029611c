// Bootstrap utilities for binary initialization
// Shared by cbmc-ci-prepare, cbmc-ci-batch-end and cbmc-ci-webhook

use crate::batch::{AwsBatchSubmitter, JobSubmitter};
use crate::cloudwatch::{CloudWatchRecorder, MetricsSink};
use crate::codebuild::{BuildStarter, CodeBuildStarter};
use crate::config::Settings;
use crate::github::{
    GithubStatusClient, SecretsManagerTokenProvider, StaticTokenProvider, StatusReporter,
    TokenProvider,
};
use crate::storage::{BookkeepingStore, ObjectStore, S3ObjectStore};
use crate::telemetry;
use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::sync::Arc;
use tracing::{info, warn};

/// Initialize logging (and the metrics exporter when a port is configured)
/// Used by: all binaries
pub fn init_telemetry(settings: &Settings) -> Result<()> {
    let observability = &settings.observability;
    telemetry::init_logging(
        &observability.log_level,
        observability.json_logs,
        observability.tracing_endpoint.as_deref(),
    )?;
    if let Some(port) = observability.metrics_port {
        telemetry::init_metrics(port)?;
    }
    Ok(())
}

/// Install the CloudWatch recorder unless disabled or Prometheus is in use
/// Used by: cbmc-ci-prepare (buffered), cbmc-ci-batch-end (EMF)
pub fn init_cloudwatch_metrics(
    settings: &Settings,
    sink: MetricsSink,
) -> Result<Option<CloudWatchRecorder>> {
    let Some(recorder) = cloudwatch_recorder(settings, sink) else {
        return Ok(None);
    };
    metrics::set_global_recorder(recorder.clone())
        .map_err(|_| anyhow::anyhow!("A metrics recorder is already installed"))?;
    info!(namespace = %recorder.namespace(), sink = ?sink, "CloudWatch metrics recorder installed");
    Ok(Some(recorder))
}

fn cloudwatch_recorder(settings: &Settings, sink: MetricsSink) -> Option<CloudWatchRecorder> {
    let observability = &settings.observability;
    if !observability.cloudwatch_metrics || observability.metrics_port.is_some() {
        return None;
    }
    Some(CloudWatchRecorder::new(observability.project_name.clone(), sink))
}

/// Send buffered metrics; a failure is logged and otherwise ignored
/// Used by: cbmc-ci-prepare
pub async fn flush_cloudwatch_metrics(recorder: &CloudWatchRecorder, sdk_config: &SdkConfig) {
    let client = aws_sdk_cloudwatch::Client::new(sdk_config);
    if let Err(e) = recorder.flush(&client).await {
        warn!(error = %e, "Failed to send CloudWatch metrics");
    }
}

/// Load the shared AWS SDK configuration for the configured region
/// Used by: all binaries
#[tracing::instrument(skip(settings))]
pub async fn load_aws_config(settings: &Settings) -> SdkConfig {
    info!(region = %settings.aws.region, profile = ?settings.aws.profile, "Loading AWS configuration");
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(settings.aws.region.clone()));
    if let Some(profile) = &settings.aws.profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

/// Initialize the proofs bucket and the bookkeeping store on top of it
/// Used by: cbmc-ci-prepare, cbmc-ci-batch-end
#[tracing::instrument(skip(settings))]
pub fn init_bookkeeping_store(settings: &Settings) -> Result<BookkeepingStore> {
    let store = S3ObjectStore::new(&settings.aws.proofs_bucket, &settings.aws)
        .context("Failed to initialize S3 client for the proofs bucket")?;
    info!(bucket = %settings.aws.proofs_bucket, "Bookkeeping store initialized");
    Ok(BookkeepingStore::new(Arc::new(store) as Arc<dyn ObjectStore>))
}

/// GitHub token source: the configured token, else Secrets Manager
pub fn init_token_provider(settings: &Settings, sdk_config: &SdkConfig) -> Arc<dyn TokenProvider> {
    match settings.github.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            info!("Using configured GitHub token");
            Arc::new(StaticTokenProvider::new(token))
        }
        None => {
            info!(secret_id = %settings.github.token_secret_id, "Using GitHub token from Secrets Manager");
            Arc::new(SecretsManagerTokenProvider::new(
                aws_sdk_secretsmanager::Client::new(sdk_config),
                settings.github.token_secret_id.clone(),
            ))
        }
    }
}

/// Initialize the GitHub commit status client
/// Used by: cbmc-ci-prepare, cbmc-ci-batch-end
#[tracing::instrument(skip(settings, tokens))]
pub fn init_status_reporter(
    settings: &Settings,
    tokens: Arc<dyn TokenProvider>,
) -> Result<Arc<dyn StatusReporter>> {
    let client = GithubStatusClient::new(
        &settings.github,
        settings.aws.proofs_bucket.clone(),
        settings.observability.project_name.clone(),
        tokens,
    )
    .context("Failed to initialize GitHub status client")?;
    info!(
        updating_status = settings.github.updating_status,
        "GitHub status client initialized"
    );
    Ok(Arc::new(client))
}

/// Initialize the AWS Batch job submitter
/// Used by: cbmc-ci-prepare
pub fn init_job_submitter(settings: &Settings, sdk_config: &SdkConfig) -> Arc<dyn JobSubmitter> {
    info!(
        job_queue = %settings.batch.job_queue,
        job_definition = %settings.batch.job_definition,
        "Batch submitter initialized"
    );
    Arc::new(AwsBatchSubmitter::new(
        aws_sdk_batch::Client::new(sdk_config),
        settings.batch.job_queue.clone(),
        settings.batch.job_definition.clone(),
    ))
}

/// Initialize the starter of prepare builds
/// Used by: cbmc-ci-webhook
pub fn init_build_starter(settings: &Settings, sdk_config: &SdkConfig) -> Arc<dyn BuildStarter> {
    info!(project = %settings.codebuild.prepare_project, "CodeBuild starter initialized");
    Arc::new(CodeBuildStarter::new(
        aws_sdk_codebuild::Client::new(sdk_config),
        settings.codebuild.prepare_project.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdk_config() -> SdkConfig {
        SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-west-2"))
            .build()
    }

    #[tokio::test]
    async fn test_static_token_preferred() {
        let mut settings = Settings::default();
        settings.github.token = Some("configured".to_string());
        let tokens = init_token_provider(&settings, &sdk_config());
        assert_eq!(tokens.token().await.unwrap(), "configured");
    }

    #[test]
    fn test_cloudwatch_recorder_selection() {
        let mut settings = Settings::default();
        let recorder = cloudwatch_recorder(&settings, MetricsSink::Emf).unwrap();
        assert_eq!(recorder.namespace(), "cbmc-ci");

        settings.observability.metrics_port = Some(9090);
        assert!(cloudwatch_recorder(&settings, MetricsSink::Emf).is_none());

        settings.observability.metrics_port = None;
        settings.observability.cloudwatch_metrics = false;
        assert!(cloudwatch_recorder(&settings, MetricsSink::Buffered).is_none());
        assert!(init_cloudwatch_metrics(&settings, MetricsSink::Buffered)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_status_reporter_from_defaults() {
        let settings = Settings::default();
        let tokens: Arc<dyn TokenProvider> = Arc::new(StaticTokenProvider::new("t"));
        assert!(init_status_reporter(&settings, tokens).is_ok());
    }
}
