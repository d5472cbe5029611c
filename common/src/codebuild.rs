// Starting cbmc-ci-prepare on CodeBuild for an accepted delivery

use crate::errors::TriggerError;
use crate::models::SourceRequest;
use async_trait::async_trait;
use aws_sdk_codebuild::error::DisplayErrorContext;
use aws_sdk_codebuild::types::{EnvironmentVariable, EnvironmentVariableType};
use tracing::{info, instrument};

#[cfg(test)]
use mockall::automock;

/// Environment of one prepare build, in the variables cbmc-ci-prepare reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareBuild {
    pub environment: Vec<(String, String)>,
}

impl PrepareBuild {
    /// `correlation_list` is extended by the prepare run with its own id
    pub fn for_source(
        source: &SourceRequest,
        correlation_list: &[String],
    ) -> Result<Self, TriggerError> {
        let correlation = serde_json::to_string(correlation_list)
            .map_err(|e| TriggerError::InvalidEnvironment(e.to_string()))?;
        let environment = [
            ("CBMC_REPOSITORY", source.clone_url.clone()),
            ("CBMC_BRANCH", source.branch.clone()),
            ("CBMC_SHA", source.sha.clone()),
            ("CBMC_ID", source.repo_id.clone()),
            ("CBMC_IS_DRAFT", source.is_draft.to_string()),
            ("CORRELATION_LIST", correlation),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
        Ok(Self { environment })
    }
}

/// Starts prepare builds and returns their ids
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BuildStarter: Send + Sync {
    async fn start(&self, build: &PrepareBuild) -> Result<String, TriggerError>;
}

/// `BuildStarter` backed by the CodeBuild `StartBuild` API
#[derive(Debug, Clone)]
pub struct CodeBuildStarter {
    client: aws_sdk_codebuild::Client,
    project: String,
}

impl CodeBuildStarter {
    pub fn new(client: aws_sdk_codebuild::Client, project: impl Into<String>) -> Self {
        Self {
            client,
            project: project.into(),
        }
    }
}

#[async_trait]
impl BuildStarter for CodeBuildStarter {
    #[instrument(skip_all, fields(project = %self.project))]
    async fn start(&self, build: &PrepareBuild) -> Result<String, TriggerError> {
        let environment = build
            .environment
            .iter()
            .map(|(name, value)| {
                EnvironmentVariable::builder()
                    .name(name)
                    .value(value)
                    .r#type(EnvironmentVariableType::Plaintext)
                    .build()
                    .map_err(|e| TriggerError::InvalidEnvironment(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .start_build()
            .project_name(&self.project)
            .set_environment_variables_override(Some(environment))
            .send()
            .await
            .map_err(|e| TriggerError::StartFailed {
                project: self.project.clone(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        let build_id = build_id_of(output.build_value().and_then(|b| b.id()), &self.project)?;
        info!(build_id = %build_id, "Started prepare build");
        Ok(build_id)
    }
}

fn build_id_of(build_id: Option<&str>, project: &str) -> Result<String, TriggerError> {
    build_id
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TriggerError::MissingBuildId(project.to_string()))
}
