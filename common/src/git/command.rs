// Subprocess execution for git and tar
//
// Every invocation is logged as a structured record (command, cwd, stdout and
// stderr lines). URLs carrying credentials are redacted before logging.

use crate::errors::CommandError;
use crate::git::repository::redact_url;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{info, instrument};

/// A command to run: program, arguments, optional working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Command line with credentials redacted, for logs and errors
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|arg| redact_url(arg)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; None when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Serialize)]
struct SubprocessRecord<'a> {
    cmd: String,
    cwd: String,
    code: Option<i32>,
    stdout: Vec<&'a str>,
    stderr: Vec<&'a str>,
}

/// Runs external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. Only a failure to spawn is an error; a non-zero exit
    /// is reported through `CommandOutput::code`.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError>;

    /// Run to completion and turn a non-zero exit into an error
    async fn run_checked(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        let output = self.run(invocation).await?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(CommandError::NonZeroExit {
                command: invocation.command_line(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// `CommandRunner` backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    #[instrument(skip_all, fields(program = %invocation.program))]
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        let command_line = invocation.command_line();
        let cwd = invocation
            .cwd
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string());
        info!("Running \"{}\" in \"{}\"", command_line, cwd);

        let mut command = tokio::process::Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| CommandError::Spawn {
            command: command_line.clone(),
            reason: e.to_string(),
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        let record = SubprocessRecord {
            cmd: command_line,
            cwd,
            code: result.code,
            stdout: result.stdout.lines().collect(),
            stderr: result.stderr.lines().collect(),
        };
        match serde_json::to_string(&record) {
            Ok(json) => info!(subprocess = %json, "Subprocess finished"),
            Err(e) => info!(error = %e, "Subprocess finished (record not serializable)"),
        }

        Ok(result)
    }
}
