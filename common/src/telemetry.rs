// Telemetry module for structured logging, metrics, and tracing

use crate::models::CommitState;
use anyhow::Result;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging
///
/// Sets up the tracing subscriber with:
/// - JSON formatting (CloudWatch friendly) or human-readable output
/// - Log levels from `RUST_LOG` or the configured level
/// - Optional OpenTelemetry integration
#[tracing::instrument(skip_all)]
pub fn init_logging(log_level: &str, json: bool, tracing_endpoint: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.to_lowercase()))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let fmt_layer = if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    let registry = tracing_subscriber::registry().with(fmt_layer.with_filter(env_filter));

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = log_level,
        json = json,
        tracing_endpoint = tracing_endpoint,
        "Structured logging initialized"
    );

    Ok(())
}

/// Initialize OpenTelemetry tracer with OTLP exporter
#[tracing::instrument(skip_all)]
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", "cbmc-ci"),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer("cbmc-ci");

    tracing::info!(endpoint = endpoint, "OpenTelemetry tracer initialized");

    Ok(tracer)
}

/// Flush remaining spans; call before the process exits
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Initialize Prometheus metrics exporter
///
/// Only useful for long-running local invocations; the lambdas and the
/// CodeBuild driver leave `metrics_port` unset.
#[tracing::instrument(skip_all)]
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    for state in [
        CommitState::Pending,
        CommitState::Success,
        CommitState::Failure,
        CommitState::Error,
    ] {
        describe_counter!(
            status_metric_name(state),
            "Number of commit statuses posted in this state"
        );
    }
    describe_counter!(
        GITHUB_UPDATE_SUCCEEDED,
        "Commit status updates accepted by GitHub"
    );
    describe_counter!(
        GITHUB_UPDATE_FAILED,
        "Commit status updates rejected by GitHub or not delivered"
    );

    tracing::info!(metrics_port = metrics_port, "Prometheus metrics exporter initialized");

    Ok(())
}

pub const GITHUB_UPDATE_SUCCEEDED: &str = "GitHub status update succeeded";
pub const GITHUB_UPDATE_FAILED: &str = "GitHub status update failed";

/// Metric name used for a posted commit status
pub fn status_metric_name(state: CommitState) -> &'static str {
    match state {
        CommitState::Pending => "Attempts",
        CommitState::Error => "Errors",
        CommitState::Success => "Successes",
        CommitState::Failure => "Failures",
    }
}

/// Record that a commit status is about to be posted
#[inline]
pub fn record_status(project: &str, state: CommitState) {
    counter!(status_metric_name(state), "project" => project.to_string()).increment(1);
}

/// Record whether a GitHub status update went through
#[inline]
pub fn record_github_update(project: &str, succeeded: bool) {
    let name = if succeeded {
        GITHUB_UPDATE_SUCCEEDED
    } else {
        GITHUB_UPDATE_FAILED
    };
    counter!(name, "project" => project.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudwatch::{CloudWatchRecorder, MetricsSink};

    #[test]
    fn test_init_logging_installs_once() {
        let _ = init_logging("INFO", false, None);
        // A global subscriber is now installed; a second one is refused
        assert!(init_logging("debug", true, None).is_err());
    }

    #[test]
    fn test_status_metric_names() {
        assert_eq!(status_metric_name(CommitState::Pending), "Attempts");
        assert_eq!(status_metric_name(CommitState::Error), "Errors");
        assert_eq!(status_metric_name(CommitState::Success), "Successes");
        assert_eq!(status_metric_name(CommitState::Failure), "Failures");
    }

    #[test]
    fn test_metrics_recording() {
        let recorder = CloudWatchRecorder::new("test-project", MetricsSink::Buffered);
        metrics::with_local_recorder(&recorder, || {
            record_status("test-project", CommitState::Failure);
            record_github_update("test-project", true);
            record_github_update("test-project", false);
            record_github_update("test-project", false);
        });
        let values = recorder.take_buffered();
        assert_eq!(values.get("Failures"), Some(&1.0));
        assert_eq!(values.get("GitHub status update succeeded"), Some(&1.0));
        assert_eq!(values.get("GitHub status update failed"), Some(&2.0));
    }
}
