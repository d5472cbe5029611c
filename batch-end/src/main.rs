// cbmc-ci-batch-end: lambda invoked on every AWS Batch job state change
//
// Only finished CBMC property jobs lead to a commit status; every other event
// is acknowledged and ignored.

mod handler;

use common::bootstrap::{
    init_bookkeeping_store, init_cloudwatch_metrics, init_status_reporter, init_telemetry,
    init_token_provider, load_aws_config,
};
use common::cloudwatch::MetricsSink;
use common::config::Settings;
use handler::BatchEndHandler;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config_dir = std::env::var("CBMC_CI_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let settings = Settings::load_from_path(&config_dir).map_err(|e| {
        eprintln!("Configuration error: {}", e);
        e
    })?;
    settings.validate()?;

    init_telemetry(&settings)?;
    init_cloudwatch_metrics(&settings, MetricsSink::Emf)?;
    info!("Starting cbmc-ci-batch-end");

    let sdk_config = load_aws_config(&settings).await;
    let tokens = init_token_provider(&settings, &sdk_config);
    let reporter = init_status_reporter(&settings, tokens)?;
    let bookkeeping = init_bookkeeping_store(&settings)?;

    let handler = Arc::new(BatchEndHandler::new(bookkeeping, reporter));

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let handler = handler.clone();
        async move {
            let result = handler.handle(event.payload).await;
            if let Err(e) = &result {
                error!(error = %e, "Batch event handling failed");
            }
            result
        }
    }))
    .await
}
