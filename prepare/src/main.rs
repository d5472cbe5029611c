// cbmc-ci-prepare: CodeBuild entry point
//
// Clone → checkout → prepare → tar → upload → launch, reporting commit
// statuses along the way. Exits non-zero when preparation fails so the build
// is marked failed.

mod cli;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use cli::Cli;
use common::bootstrap::{
    flush_cloudwatch_metrics, init_bookkeeping_store, init_cloudwatch_metrics,
    init_job_submitter, init_status_reporter, init_telemetry, init_token_provider,
    load_aws_config,
};
use common::cloudwatch::MetricsSink;
use common::config::Settings;
use common::git::SystemCommandRunner;
use common::pipeline::{Pipeline, PrepareOutcome};
use common::telemetry::shutdown_tracer;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from_path(&cli.config_dir)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    cli.apply(&mut settings);
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    init_telemetry(&settings)?;
    let cloudwatch = init_cloudwatch_metrics(&settings, MetricsSink::Buffered)?;
    info!("Starting cbmc-ci-prepare");

    let mut request = cli.prepare_request(&settings, Utc::now(), |name| std::env::var(name).ok())?;
    if request.task_id.is_none() {
        request.task_id = Some(format!("local-{}", uuid::Uuid::new_v4()));
    }
    info!(
        invocation = %serde_json::json!({
            "repository": common::git::redact_url(&request.repository),
            "branch": request.branch,
            "sha": request.sha,
            "is_draft": request.is_draft,
            "id": request.repo_id,
            "tarfile_name": request.tarfile_name,
            "tarfile_path": request.tarfile_path,
            "task_id": request.task_id,
            "correlation_list": request.correlation_list,
        }),
        "Invocation"
    );

    let sdk_config = load_aws_config(&settings).await;
    let tokens = init_token_provider(&settings, &sdk_config);
    let reporter = init_status_reporter(&settings, tokens.clone())?;
    let submitter = init_job_submitter(&settings, &sdk_config);
    let bookkeeping = init_bookkeeping_store(&settings)?;

    let pipeline = Pipeline::new(
        Arc::new(settings),
        Arc::new(SystemCommandRunner),
        reporter,
        submitter,
        bookkeeping,
    )
    .with_tokens(tokens);

    let result = pipeline.source_prepare(&request).await;
    match &result {
        Ok(PrepareOutcome::Cancelled) => info!("Preparation cancelled: commit no longer exists"),
        Ok(PrepareOutcome::Launched(jobs)) => info!(jobs = jobs.len(), "Proof jobs started"),
        Err(e) => error!(error = %e, "Preparation failed"),
    }

    if let Some(recorder) = &cloudwatch {
        flush_cloudwatch_metrics(recorder, &sdk_config).await;
    }
    shutdown_tracer();
    result?;
    Ok(())
}
