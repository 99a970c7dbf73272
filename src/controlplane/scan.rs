//! Integrity scan supervisor
//!
//! Starts the background parity check process and owns the scan status
//! record while it runs. Progress is parsed from the process output under
//! a strict grammar; anything else the tool prints is ignored. When the
//! supervisor runs as the final provisioning step it mirrors progress into
//! the provisioning record and completes it on exit.

use crate::controlplane::state::StatusBoard;
use crate::domain::model::ScanKind;
use crate::domain::ports::{CommandRunnerRef, SupervisedChild};
use crate::error::Result;
use crate::hardware::array::ArrayConfig;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Supervises the external parity check process
pub struct ScanSupervisor {
    config: ArrayConfig,
    runner: CommandRunnerRef,
    board: Arc<StatusBoard>,
}

impl ScanSupervisor {
    pub fn new(config: ArrayConfig, runner: CommandRunnerRef, board: Arc<StatusBoard>) -> Arc<Self> {
        Arc::new(Self {
            config,
            runner,
            board,
        })
    }

    /// Start a scan; rejects if one is already running
    ///
    /// `kind` labels the scan (set for rebuilds after a disk replacement).
    /// With `mirror` the provisioning record tracks scan progress and is
    /// completed when the process exits, whatever its exit code; scan
    /// failure is reported through the scan record only.
    pub async fn start(&self, kind: Option<ScanKind>, mirror: bool) -> Result<()> {
        self.board.try_begin_scan(kind)?;

        let child = match self
            .runner
            .spawn_supervised(&self.config.tool, &["check"])
            .await
        {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start parity check: {}", e);
                self.board
                    .abort_scan(format!("Failed to start parity check: {}", e));
                return Err(e);
            }
        };

        info!("Parity check started");
        let board = self.board.clone();
        tokio::spawn(async move {
            supervise(child, board, mirror).await;
        });

        Ok(())
    }
}

async fn supervise(mut child: SupervisedChild, board: Arc<StatusBoard>, mirror: bool) {
    while let Some(chunk) = child.output.recv().await {
        match parse_percent(&chunk) {
            Some(progress) => {
                board.set_scan_progress(progress);
                if mirror {
                    board.set_progress(progress);
                }
            }
            None => {
                if !chunk.trim().is_empty() {
                    debug!("Ignoring scan output: {}", chunk);
                }
            }
        }
    }

    let code = child.exit.await.unwrap_or(-1);
    board.finish_scan(code);
    if mirror {
        board.complete_provisioning();
    }

    if code == 0 {
        info!("Parity check finished");
    } else {
        warn!("Parity check exited with code {}", code);
    }
}

/// Extract a progress marker from one chunk of process output
///
/// A marker is a whitespace-delimited token of one to three ASCII digits
/// immediately followed by `%`, value at most 100. The last marker in the
/// chunk wins; partial matches are rejected rather than truncated.
fn parse_percent(chunk: &str) -> Option<u8> {
    chunk
        .split_whitespace()
        .filter_map(|token| {
            let digits = token.strip_suffix('%')?;
            if digits.is_empty()
                || digits.len() > 3
                || !digits.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }
            let value: u16 = digits.parse().ok()?;
            if value > 100 {
                return None;
            }
            Some(value as u8)
        })
        .last()
}
