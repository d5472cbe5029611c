// cbmc-ci-webhook: lambda behind API Gateway receiving GitHub deliveries
//
// Starts the CodeBuild project running cbmc-ci-prepare for the commit each
// delivery names (repository, id, branch, sha, draft flag).

mod handler;

use common::bootstrap::{init_build_starter, init_telemetry, load_aws_config};
use common::config::Settings;
use handler::{ProxyRequest, ProxyResponse, WebhookHandler};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config_dir = std::env::var("CBMC_CI_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let settings = Settings::load_from_path(&config_dir).map_err(|e| {
        eprintln!("Configuration error: {}", e);
        e
    })?;
    settings.validate()?;

    init_telemetry(&settings)?;
    info!(
        signature_check = settings.github.webhook_secret.is_some(),
        "Starting cbmc-ci-webhook"
    );

    let sdk_config = load_aws_config(&settings).await;
    let starter = init_build_starter(&settings, &sdk_config);
    let handler = Arc::new(WebhookHandler::new(
        settings.github.webhook_secret.clone(),
        starter,
    ));

    lambda_runtime::run(service_fn(move |event: LambdaEvent<ProxyRequest>| {
        let handler = handler.clone();
        async move {
            let response = handler
                .handle(&event.payload, &event.context.request_id)
                .await;
            Ok::<ProxyResponse, Error>(response)
        }
    }))
    .await
}
