// GitHub personal access token retrieval

use crate::errors::GithubError;
use async_trait::async_trait;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, GithubError>;
}

/// A token given directly through configuration
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"***")
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, GithubError> {
        Ok(self.token.clone())
    }
}

#[derive(Deserialize)]
struct PatEntry {
    #[serde(rename = "GitHubPAT")]
    github_pat: String,
}

/// Extract the token from a secret string shaped `[{"GitHubPAT": "<token>"}]`
pub fn parse_token_secret(secret: &str) -> Result<String, GithubError> {
    let entries: Vec<PatEntry> = serde_json::from_str(secret)
        .map_err(|e| GithubError::InvalidTokenSecret(e.to_string()))?;
    entries
        .into_iter()
        .next()
        .map(|entry| entry.github_pat)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| GithubError::InvalidTokenSecret("no GitHubPAT entry".to_string()))
}

/// Token stored in AWS Secrets Manager; fetched once per process
#[derive(Debug)]
pub struct SecretsManagerTokenProvider {
    client: aws_sdk_secretsmanager::Client,
    secret_id: String,
    cached: OnceCell<String>,
}

impl SecretsManagerTokenProvider {
    pub fn new(client: aws_sdk_secretsmanager::Client, secret_id: impl Into<String>) -> Self {
        Self {
            client,
            secret_id: secret_id.into(),
            cached: OnceCell::new(),
        }
    }

    async fn fetch(&self) -> Result<String, GithubError> {
        debug!(secret_id = %self.secret_id, "Fetching GitHub token secret");
        let output = self
            .client
            .get_secret_value()
            .secret_id(&self.secret_id)
            .send()
            .await
            .map_err(|e| GithubError::TokenUnavailable(DisplayErrorContext(&e).to_string()))?;
        let secret = output.secret_string().ok_or_else(|| {
            GithubError::InvalidTokenSecret(format!("{} has no string value", self.secret_id))
        })?;
        parse_token_secret(secret)
    }
}

#[async_trait]
impl TokenProvider for SecretsManagerTokenProvider {
    #[instrument(skip(self), fields(secret_id = %self.secret_id))]
    async fn token(&self) -> Result<String, GithubError> {
        self.cached
            .get_or_try_init(|| self.fetch())
            .await
            .cloned()
    }
}
