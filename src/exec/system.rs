//! System command runner
//!
//! Executes external tools as OS subprocesses via `tokio::process`.
//! Privileged invocations are wrapped with `sudo` unless the runner is
//! configured to run them directly (e.g. when the operator runs as root).

use crate::domain::ports::{command_line, CommandOutput, CommandRunner, SupervisedChild};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

// =============================================================================
// Runner Configuration
// =============================================================================

/// Configuration for the system runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Elevation binary prefixed to privileged commands; `None` runs them
    /// directly (operator already has the required privileges)
    pub sudo: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            sudo: Some("sudo".to_string()),
        }
    }
}

// =============================================================================
// System Runner
// =============================================================================

/// Real [`CommandRunner`] backed by OS subprocesses
pub struct SystemRunner {
    config: RunnerConfig,
}

impl SystemRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Compose the argv for a privileged invocation
    fn elevate(&self, program: &str, args: &[&str]) -> (String, Vec<String>) {
        match &self.config.sudo {
            Some(sudo) => {
                let mut argv = Vec::with_capacity(args.len() + 1);
                argv.push(program.to_string());
                argv.extend(args.iter().map(|a| a.to_string()));
                (sudo.clone(), argv)
            }
            None => (
                program.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
            ),
        }
    }

    async fn execute(&self, program: &str, args: &[String], cmdline: &str) -> Result<CommandOutput> {
        debug!("Running command: {}", cmdline);

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| spawn_error(program, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!("Command failed: {} (exit code {})", cmdline, code);
            return Err(Error::CommandFailed {
                command: cmdline.to_string(),
                code,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let display = command_line(program, args);
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.execute(program, &args, &display).await
    }

    async fn run_privileged(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let display = command_line(program, args);
        let (elevated, argv) = self.elevate(program, args);
        self.execute(&elevated, &argv, &display).await
    }

    async fn spawn_supervised(&self, program: &str, args: &[&str]) -> Result<SupervisedChild> {
        let cmdline = command_line(program, args);
        debug!("Spawning supervised process: {}", cmdline);

        let (elevated, argv) = self.elevate(program, args);
        let mut child = Command::new(&elevated)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(program, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal(format!("no stdout pipe for {}", cmdline)))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal(format!("no stderr pipe for {}", cmdline)))?;

        let (tx, rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(async move {
            let out_tx = tx.clone();
            let drain_stdout = async move {
                let mut lines = BufReader::new(stdout).lines();
                // Keep draining to EOF even if the receiver is gone, so the
                // child never blocks on a full pipe.
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = out_tx.send(line).await;
                }
            };
            let err_tx = tx;
            let drain_stderr = async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = err_tx.send(line).await;
                }
            };
            futures::future::join(drain_stdout, drain_stderr).await;

            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    warn!("Failed to reap supervised process: {}", e);
                    -1
                }
            };
            let _ = exit_tx.send(code);
        });

        Ok(SupervisedChild {
            output: rx,
            exit: exit_rx,
        })
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> Error {
    if e.kind() == ErrorKind::NotFound {
        Error::ToolUnavailable {
            tool: program.to_string(),
        }
    } else {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn unprivileged() -> SystemRunner {
        SystemRunner::new(RunnerConfig { sudo: None })
    }

    #[test]
    fn test_elevate_with_sudo() {
        let runner = SystemRunner::new(RunnerConfig::default());
        let (program, argv) = runner.elevate("nmdctl", &["start"]);
        assert_eq!(program, "sudo");
        assert_eq!(argv, vec!["nmdctl".to_string(), "start".to_string()]);
    }

    #[test]
    fn test_elevate_direct() {
        let runner = unprivileged();
        let (program, argv) = runner.elevate("nmdctl", &["start"]);
        assert_eq!(program, "nmdctl");
        assert_eq!(argv, vec!["start".to_string()]);
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let runner = unprivileged();
        let output = runner.run("echo", &["hello"]).await.unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_missing_tool() {
        let runner = unprivileged();
        let err = runner
            .run("definitely-not-a-real-binary-7f3a", &[])
            .await
            .unwrap_err();
        assert_matches!(err, Error::ToolUnavailable { .. });
    }

    #[tokio::test]
    async fn test_run_nonzero_exit() {
        let runner = unprivileged();
        let err = runner.run("sh", &["-c", "exit 3"]).await.unwrap_err();
        assert_matches!(err, Error::CommandFailed { code: 3, .. });
    }

    #[tokio::test]
    async fn test_supervised_streams_and_exits() {
        let runner = unprivileged();
        let mut child = runner
            .spawn_supervised("sh", &["-c", "echo 10%; echo 50%; exit 0"])
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Some(chunk) = child.output.recv().await {
            seen.push(chunk);
        }
        assert_eq!(seen, vec!["10%".to_string(), "50%".to_string()]);
        assert_eq!(child.exit.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_supervised_reports_failure_code() {
        let runner = unprivileged();
        let mut child = runner
            .spawn_supervised("sh", &["-c", "exit 2"])
            .await
            .unwrap();
        while child.output.recv().await.is_some() {}
        assert_eq!(child.exit.await.unwrap(), 2);
    }
}
