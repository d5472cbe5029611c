// GitHub webhook delivery handling (API Gateway proxy integration)

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::codebuild::{BuildStarter, PrepareBuild};
use common::errors::EventError;
use common::github::{header_value, parse_event, SIGNATURE_HEADER};
use common::models::SourceRequest;
use common::webhook::verify_signature;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The parts of an API Gateway proxy request the handler reads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    /// API Gateway sends `null` for a request without headers
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ProxyResponse {
    fn json(status_code: u16, body: &Value) -> Self {
        Self {
            status_code,
            headers: HashMap::from([(
                "content-type".to_string(),
                "application/json".to_string(),
            )]),
            body: body.to_string(),
        }
    }

    fn error(status_code: u16, err: &dyn std::error::Error) -> Self {
        Self::json(status_code, &json!({"error": err.to_string()}))
    }
}

pub struct WebhookHandler {
    secret: Option<String>,
    starter: Arc<dyn BuildStarter>,
}

impl WebhookHandler {
    /// `secret` enables `X-Hub-Signature-256` verification
    pub fn new(secret: Option<String>, starter: Arc<dyn BuildStarter>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            starter,
        }
    }

    fn body_bytes(request: &ProxyRequest) -> Result<Vec<u8>, EventError> {
        let body = request.body.as_deref().unwrap_or_default();
        if request.is_base64_encoded {
            STANDARD
                .decode(body)
                .map_err(|e| EventError::InvalidJson(format!("invalid base64 body: {}", e)))
        } else {
            Ok(body.as_bytes().to_vec())
        }
    }

    /// Verify and parse the delivery, then start a prepare build for the
    /// commit it names. `invocation_id` seeds the correlation list.
    pub async fn handle(&self, request: &ProxyRequest, invocation_id: &str) -> ProxyResponse {
        let empty = HashMap::new();
        let headers = request.headers.as_ref().unwrap_or(&empty);

        let body = match Self::body_bytes(request) {
            Ok(body) => body,
            Err(e) => return ProxyResponse::error(400, &e),
        };

        if let Some(secret) = &self.secret {
            let signature = header_value(headers, SIGNATURE_HEADER).unwrap_or_default();
            if let Err(e) = verify_signature(secret, &body, signature) {
                warn!("Rejecting delivery with missing or invalid signature");
                return ProxyResponse::error(401, &e);
            }
        }

        let body = match String::from_utf8(body) {
            Ok(body) => body,
            Err(e) => return ProxyResponse::error(400, &EventError::InvalidJson(e.to_string())),
        };

        match parse_event(headers, &body) {
            Ok(Some(source)) => {
                info!(repository = %source.full_name, sha = %source.sha, "Verification requested");
                self.start_prepare(&source, invocation_id).await
            }
            Ok(None) => ProxyResponse::json(200, &json!({"ignored": true})),
            Err(e) => {
                warn!(error = %e, "Rejecting delivery");
                ProxyResponse::error(400, &e)
            }
        }
    }

    async fn start_prepare(&self, source: &SourceRequest, invocation_id: &str) -> ProxyResponse {
        let correlation_list = vec![invocation_id.to_string()];
        let build_id = match PrepareBuild::for_source(source, &correlation_list) {
            Ok(build) => self.starter.start(&build).await,
            Err(e) => Err(e),
        };
        let build_id = match build_id {
            Ok(build_id) => build_id,
            Err(e) => {
                error!(error = %e, sha = %source.sha, "Failed to start prepare build");
                return ProxyResponse::error(500, &e);
            }
        };

        match serde_json::to_value(source) {
            Ok(Value::Object(mut body)) => {
                body.insert("build_id".to_string(), Value::String(build_id));
                ProxyResponse::json(200, &Value::Object(body))
            }
            Ok(other) => ProxyResponse::json(200, &other),
            Err(e) => ProxyResponse::error(500, &e),
        }
    }
}
