//! Domain ports - trait seams between the operator and external systems
//!
//! Every external command goes through [`CommandRunner`] so components can
//! be exercised against a scripted double in tests.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

// =============================================================================
// Command Execution
// =============================================================================

/// Captured output of a completed external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Handle to a long-running supervised process
///
/// `output` delivers text chunks as the process emits them (stdout and
/// stderr merged); `exit` resolves exactly once with the exit code.
#[derive(Debug)]
pub struct SupervisedChild {
    pub output: mpsc::Receiver<String>,
    pub exit: oneshot::Receiver<i32>,
}

/// Port for invoking external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a command that requires elevated privileges
    async fn run_privileged(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Spawn a privileged long-running process and stream its output
    async fn spawn_supervised(&self, program: &str, args: &[&str]) -> Result<SupervisedChild>;
}

pub type CommandRunnerRef = Arc<dyn CommandRunner>;

/// Render a command line for logs and error messages
pub fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_rendering() {
        assert_eq!(command_line("nmdctl", &[]), "nmdctl");
        assert_eq!(
            command_line("nmdctl", &["status", "-o", "json"]),
            "nmdctl status -o json"
        );
    }
}
