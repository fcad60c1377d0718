use crate::error::{Result, ToolError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const LOG_BYTES_MAX: usize = 32_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawns an already-validated program, waits for it, and captures its output.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput>;
}

/// Runs children directly (no shell) from a fixed working directory.
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    working_directory: PathBuf,
    timeout: Option<Duration>,
}

impl TokioProcessRunner {
    pub fn new(working_directory: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            working_directory: working_directory.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    #[tracing::instrument(level = "info", skip_all, fields(program = %program))]
    async fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, cmd.output())
                .await
                .map_err(|_| {
                    ToolError::ExternalFailure(format!(
                        "command timed out after {}s",
                        timeout.as_secs()
                    ))
                })?,
            None => cmd.output().await,
        }
        .map_err(|e| ToolError::ExternalFailure(format!("failed to spawn {program}: {e}")))?;

        Ok(ProcessOutput {
            stdout: truncate_log(&output.stdout),
            stderr: truncate_log(&output.stderr),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Keep the tail of a child's output; the end is where scripts report results.
fn truncate_log(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(LOG_BYTES_MAX);
    String::from_utf8_lossy(&bytes[start..]).to_string()
}
