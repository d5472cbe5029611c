// Commit status reporting
//
// Status updates are best-effort: a failed update is logged and counted, never
// surfaced to the caller.

use crate::config::GithubConfig;
use crate::errors::GithubError;
use crate::github::token::TokenProvider;
use crate::models::{CommitState, StatusUpdate};
use crate::retry::{ExponentialBackoff, RetryStrategy};
use crate::telemetry::{record_github_update, record_status};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

/// Longest description GitHub accepts
pub const MAX_DESCRIPTION_CHARS: usize = 140;

const USER_AGENT: &str = concat!("cbmc-ci/", env!("CARGO_PKG_VERSION"));

#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, update: &StatusUpdate);
}

/// Body of `POST /repositories/{id}/statuses/{sha}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusPayload {
    pub state: CommitState,
    pub context: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

/// S3 console folder holding a job's output
pub fn target_url(bucket: &str, job_name: &str) -> String {
    format!(
        "https://s3.console.aws.amazon.com/s3/buckets/{}/{}/out/",
        bucket, job_name
    )
}

impl StatusPayload {
    pub fn build(update: &StatusUpdate, context_prefix: &str, bucket: &str) -> Self {
        Self {
            state: update.state,
            context: format!("{}{}", context_prefix, update.context),
            description: update.description.chars().take(MAX_DESCRIPTION_CHARS).collect(),
            target_url: update.job_name.as_deref().map(|job| target_url(bucket, job)),
        }
    }
}

/// How an update was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Status updating is disabled; the payload was only logged
    DryRun,
    Posted { rate_limit_remaining: Option<u32> },
}

/// Posts commit statuses through the GitHub REST API
pub struct GithubStatusClient {
    http: reqwest::Client,
    api_url: String,
    context_prefix: String,
    bucket: String,
    project: String,
    updating_status: bool,
    tokens: Arc<dyn TokenProvider>,
    retry: ExponentialBackoff,
}

impl GithubStatusClient {
    pub fn new(
        config: &GithubConfig,
        bucket: impl Into<String>,
        project: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, GithubError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            context_prefix: config.context_prefix.clone(),
            bucket: bucket.into(),
            project: project.into(),
            updating_status: config.updating_status,
            tokens,
            retry: ExponentialBackoff::new(config.max_attempts),
        })
    }

    pub fn with_retry(mut self, retry: ExponentialBackoff) -> Self {
        self.retry = retry;
        self
    }

    /// Send one update, retrying transport errors and 5xx responses
    #[instrument(skip_all, fields(state = %update.state, context = %update.context))]
    pub async fn send(&self, update: &StatusUpdate) -> Result<Delivery, GithubError> {
        let payload = StatusPayload::build(update, &self.context_prefix, &self.bucket);
        let payload_json = serde_json::to_string_pretty(&payload)
            .map_err(|e| GithubError::RequestFailed(e.to_string()))?;

        if !self.updating_status {
            info!("Not updating GitHub status\n{}", payload_json);
            return Ok(Delivery::DryRun);
        }
        info!("Updating GitHub status\n{}", payload_json);

        let token = self.tokens.token().await?;
        let url = format!(
            "{}/repositories/{}/statuses/{}",
            self.api_url, update.repo_id, update.sha
        );

        let mut attempt = 0;
        loop {
            match self.post_once(&url, &token, &payload).await {
                Ok(remaining) => {
                    info!("1-hour rate limit remaining: {:?}", remaining);
                    return Ok(Delivery::Posted {
                        rate_limit_remaining: remaining,
                    });
                }
                Err(e) if is_retryable(&e) => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        warn!(error = %e, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Retrying GitHub status update");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once(
        &self,
        url: &str,
        token: &str,
        payload: &StatusPayload,
    ) -> Result<Option<u32>, GithubError> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, format!("token {}", token))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(payload)
            .send()
            .await?;

        let remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let status = response.status();
        if status.is_success() {
            Ok(remaining)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(GithubError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn is_retryable(err: &GithubError) -> bool {
    match err {
        GithubError::RequestFailed(_) => true,
        GithubError::UnexpectedStatus { status, .. } => *status >= 500,
        GithubError::TokenUnavailable(_) | GithubError::InvalidTokenSecret(_) => false,
    }
}

#[async_trait]
impl StatusReporter for GithubStatusClient {
    async fn report(&self, update: &StatusUpdate) {
        if update.record_metric {
            record_status(&self.project, update.state);
        }
        match self.send(update).await {
            Ok(_) => record_github_update(&self.project, true),
            Err(e) => {
                error!(error = %e, "Failed to update status on GitHub");
                record_github_update(&self.project, false);
            }
        }
    }
}
