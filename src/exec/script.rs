//! Scripted command runner for tests
//!
//! Returns canned results keyed by the full command line and records every
//! invocation in order, so tests can assert exactly which external commands
//! ran and in what sequence. Commands without a script succeed with empty
//! output. The last scripted result for a command is sticky, so repeated
//! identical queries (e.g. status polls) keep answering.

use crate::domain::ports::{command_line, CommandOutput, CommandRunner, SupervisedChild};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone)]
enum Scripted {
    Output(String),
    Fail { code: i32, stderr: String },
    Unavailable,
}

#[derive(Debug, Clone)]
struct ScriptedScan {
    chunks: Vec<String>,
    exit: i32,
}

/// Test double for [`CommandRunner`]
#[derive(Default)]
pub struct ScriptedRunner {
    outputs: Mutex<HashMap<String, VecDeque<Scripted>>>,
    scans: Mutex<HashMap<String, ScriptedScan>>,
    delays: Mutex<HashMap<String, std::time::Duration>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script stdout for a command line
    pub fn on_stdout(&self, command: &str, stdout: &str) {
        self.outputs
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(Scripted::Output(stdout.to_string()));
    }

    /// Script a non-zero exit for a command line
    pub fn on_failure(&self, command: &str, code: i32, stderr: &str) {
        self.outputs
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(Scripted::Fail {
                code,
                stderr: stderr.to_string(),
            });
    }

    /// Script a missing binary for a command line
    pub fn on_unavailable(&self, command: &str) {
        self.outputs
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(Scripted::Unavailable);
    }

    /// Make a command take a while, so tests can observe in-flight state
    pub fn on_delay(&self, command: &str, delay: std::time::Duration) {
        self.delays.lock().insert(command.to_string(), delay);
    }

    /// Script the output stream and exit code of a supervised process
    pub fn on_supervised(&self, command: &str, chunks: &[&str], exit: i32) {
        self.scans.lock().insert(
            command.to_string(),
            ScriptedScan {
                chunks: chunks.iter().map(|c| c.to_string()).collect(),
                exit,
            },
        );
    }

    /// Every command line invoked, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn next_result(&self, command: &str) -> Result<CommandOutput> {
        let mut outputs = self.outputs.lock();
        let scripted = match outputs.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match scripted {
            Some(Scripted::Output(stdout)) => Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            }),
            Some(Scripted::Fail { code, stderr }) => Err(Error::CommandFailed {
                command: command.to_string(),
                code,
                stderr,
            }),
            Some(Scripted::Unavailable) => {
                let tool = command.split_whitespace().next().unwrap_or(command);
                Err(Error::ToolUnavailable {
                    tool: tool.to_string(),
                })
            }
            None => Ok(CommandOutput::default()),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let command = command_line(program, args);
        self.calls.lock().push(command.clone());
        let delay = self.delays.lock().get(&command).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.next_result(&command)
    }

    async fn run_privileged(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        self.run(program, args).await
    }

    async fn spawn_supervised(&self, program: &str, args: &[&str]) -> Result<SupervisedChild> {
        let command = command_line(program, args);
        self.calls.lock().push(command.clone());

        let script = self
            .scans
            .lock()
            .get(&command)
            .cloned()
            .unwrap_or(ScriptedScan {
                chunks: Vec::new(),
                exit: 0,
            });

        let (tx, rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(async move {
            for chunk in script.chunks {
                let _ = tx.send(chunk).await;
            }
            let _ = exit_tx.send(script.exit);
        });

        Ok(SupervisedChild {
            output: rx,
            exit: exit_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let runner = ScriptedRunner::new();
        runner.run("lsblk", &["-J"]).await.unwrap();
        runner.run_privileged("nmdctl", &["start"]).await.unwrap();
        assert_eq!(runner.calls(), vec!["lsblk -J", "nmdctl start"]);
    }

    #[tokio::test]
    async fn test_sticky_last_result() {
        let runner = ScriptedRunner::new();
        runner.on_stdout("df -B1 /mnt/disk1", "line");
        let a = runner.run("df", &["-B1", "/mnt/disk1"]).await.unwrap();
        let b = runner.run("df", &["-B1", "/mnt/disk1"]).await.unwrap();
        assert_eq!(a.stdout, b.stdout);
    }

    #[tokio::test]
    async fn test_scripted_failure_sequence() {
        let runner = ScriptedRunner::new();
        runner.on_failure("nmdctl start", 1, "boom");
        runner.on_stdout("nmdctl start", "ok");
        let err = runner.run_privileged("nmdctl", &["start"]).await.unwrap_err();
        assert_matches!(err, Error::CommandFailed { code: 1, .. });
        assert!(runner.run_privileged("nmdctl", &["start"]).await.is_ok());
    }

    #[tokio::test]
    async fn test_supervised_script() {
        let runner = ScriptedRunner::new();
        runner.on_supervised("nmdctl check", &["5%", "99%"], 0);
        let mut child = runner.spawn_supervised("nmdctl", &["check"]).await.unwrap();
        let mut seen = Vec::new();
        while let Some(chunk) = child.output.recv().await {
            seen.push(chunk);
        }
        assert_eq!(seen, vec!["5%", "99%"]);
        assert_eq!(child.exit.await.unwrap(), 0);
    }
}
