// Configuration management with layered configuration (defaults, file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub aws: AwsConfig,
    pub batch: BatchConfig,
    pub github: GithubConfig,
    pub proofs: ProofsConfig,
    pub codebuild: CodebuildConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    /// Custom S3-compatible endpoint (MinIO, localstack). Unset means AWS S3.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub proofs_bucket: String,
    /// Bucket of the CI tools. Accepted so existing deployments keep loading;
    /// no driver reads it.
    #[serde(default)]
    pub tools_bucket: Option<String>,
    /// Key prefix for source tarballs inside the proofs bucket
    #[serde(default)]
    pub tar_path: Option<String>,
    /// Named AWS profile; unset means the default credential chain
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub job_queue: String,
    pub job_definition: String,
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
}

fn default_stages() -> Vec<String> {
    ["build", "property", "coverage", "report"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub api_url: String,
    pub token_secret_id: String,
    /// Static token; when set, Secrets Manager is not consulted
    #[serde(default)]
    pub token: Option<String>,
    /// When false, status updates are only logged
    #[serde(default)]
    pub updating_status: bool,
    pub context_prefix: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    pub timeout_seconds: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofsConfig {
    pub markers: Vec<String>,
    pub yaml_name: String,
    pub prepare_script: String,
    pub python: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodebuildConfig {
    /// Project running cbmc-ci-prepare for each accepted delivery
    pub prepare_project: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default = "default_json_logs")]
    pub json_logs: bool,
    #[serde(default)]
    pub metrics_port: Option<u16>,
    /// Publish the status counters to CloudWatch under `project_name`.
    /// Ignored when `metrics_port` selects the Prometheus exporter.
    #[serde(default = "default_cloudwatch_metrics")]
    pub cloudwatch_metrics: bool,
    #[serde(default)]
    pub tracing_endpoint: Option<String>,
    pub project_name: String,
}

fn default_json_logs() -> bool {
    true
}

fn default_cloudwatch_metrics() -> bool {
    true
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env → legacy env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        Self::load_with_env(config_dir, |name| std::env::var(name).ok())
    }

    /// Load configuration reading the legacy variables through `lookup`
    ///
    /// The deployed CI stacks export a handful of variables without the `APP__`
    /// prefix. They take precedence over every other layer. Empty values are
    /// treated as unset.
    pub fn load_with_env<P, F>(config_dir: P, lookup: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_dir = config_dir.as_ref();
        let env = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let proofs_bucket = env("S3_BUCKET_PROOFS")
            .or_else(|| env("S3_BKT"))
            .or_else(|| env("S3_BUCKET"));
        let updating_status = env("CBMC_CI_UPDATING_STATUS")
            .map(|v| v.trim().eq_ignore_ascii_case("true"));

        let builder = Config::builder()
            // Start with built-in defaults
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("aws.proofs_bucket", proofs_bucket)?
            .set_override_option("aws.tools_bucket", env("S3_BUCKET_TOOLS"))?
            .set_override_option("aws.tar_path", env("S3_TAR_PATH"))?
            .set_override_option("aws.region", env("AWS_REGION"))?
            .set_override_option("github.updating_status", updating_status)?
            .set_override_option("codebuild.prepare_project", env("PREPARE_PROJECT"))?
            .set_override_option("observability.project_name", env("PROJECT_NAME"))?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.aws.region.is_empty() {
            return Err("AWS region cannot be empty".to_string());
        }
        if self.aws.proofs_bucket.is_empty() {
            return Err("Proofs bucket cannot be empty".to_string());
        }

        if self.batch.job_queue.is_empty() {
            return Err("Batch job_queue cannot be empty".to_string());
        }
        if self.batch.job_definition.is_empty() {
            return Err("Batch job_definition cannot be empty".to_string());
        }
        if self.batch.stages.is_empty() {
            return Err("Batch stages cannot be empty".to_string());
        }

        if self.github.api_url.is_empty() {
            return Err("GitHub api_url cannot be empty".to_string());
        }
        if self.github.max_attempts == 0 {
            return Err("GitHub max_attempts must be greater than 0".to_string());
        }

        if self.proofs.markers.is_empty() {
            return Err("At least one proof marker is required".to_string());
        }
        if self.proofs.yaml_name.is_empty() {
            return Err("Proof yaml_name cannot be empty".to_string());
        }

        if self.codebuild.prepare_project.is_empty() {
            return Err("CodeBuild prepare_project cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            aws: AwsConfig {
                region: "us-west-2".to_string(),
                endpoint: None,
                proofs_bucket: "cbmc-ci-proofs".to_string(),
                tools_bucket: None,
                tar_path: None,
                profile: None,
            },
            batch: BatchConfig {
                job_queue: "CBMCJobQueue".to_string(),
                job_definition: "CBMCJobDefinition".to_string(),
                stages: default_stages(),
            },
            github: GithubConfig {
                api_url: "https://api.github.com".to_string(),
                token_secret_id: "GitHubCommitStatusPAT".to_string(),
                token: None,
                updating_status: false,
                context_prefix: "CBMC Batch: ".to_string(),
                webhook_secret: None,
                timeout_seconds: 30,
                max_attempts: 3,
            },
            proofs: ProofsConfig {
                markers: vec!["cbmc/proofs".to_string(), ".cbmc-batch/jobs".to_string()],
                yaml_name: "cbmc-batch.yaml".to_string(),
                prepare_script: "prepare.py".to_string(),
                python: "python".to_string(),
            },
            codebuild: CodebuildConfig {
                prepare_project: "Prepare-Source-Project".to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
                metrics_port: None,
                cloudwatch_metrics: true,
                tracing_endpoint: None,
                project_name: "cbmc-ci".to_string(),
            },
        }
    }
}
