//! Shared status records
//!
//! The provisioning and scan status records are process-wide singletons:
//! the orchestrator writes the former, the scan supervisor the latter, and
//! the polling endpoints read cloned snapshots. Every transition is a
//! check-and-set method on the board so begin-guards are atomic; callers
//! never read-then-write.

use crate::domain::model::{ProvisioningState, ProvisioningStep, ScanKind, ScanState};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Holder of the two process-wide status records
#[derive(Default)]
pub struct StatusBoard {
    provisioning: Mutex<ProvisioningState>,
    scan: Mutex<ScanState>,
}

impl StatusBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // =========================================================================
    // Provisioning Record
    // =========================================================================

    /// Snapshot of the provisioning record
    pub fn provisioning(&self) -> ProvisioningState {
        self.provisioning.lock().clone()
    }

    /// Atomically claim the provisioning record for a new run
    ///
    /// Rejects if a run is already active; otherwise resets the record to
    /// the first step.
    pub fn try_begin_provisioning(&self) -> Result<()> {
        let mut state = self.provisioning.lock();
        if state.active {
            return Err(Error::ProvisioningActive);
        }
        *state = ProvisioningState {
            active: true,
            step: Some(ProvisioningStep::Partition),
            progress: 0,
            error: None,
        };
        Ok(())
    }

    /// Enter a pipeline step; progress is step-local and resets to zero
    pub fn begin_step(&self, step: ProvisioningStep) {
        info!("Provisioning step: {}", step);
        let mut state = self.provisioning.lock();
        state.step = Some(step);
        state.progress = 0;
    }

    pub fn set_progress(&self, progress: u8) {
        self.provisioning.lock().progress = progress.min(100);
    }

    /// Terminal success state
    pub fn complete_provisioning(&self) {
        let mut state = self.provisioning.lock();
        state.active = false;
        state.step = Some(ProvisioningStep::Complete);
        state.progress = 100;
        state.error = None;
    }

    /// Terminal failure state; completed steps are left in place
    pub fn fail_provisioning(&self, message: String) {
        let mut state = self.provisioning.lock();
        state.active = false;
        state.error = Some(message);
    }

    // =========================================================================
    // Scan Record
    // =========================================================================

    /// Snapshot of the scan record
    pub fn scan(&self) -> ScanState {
        self.scan.lock().clone()
    }

    /// Atomically claim the scan record for a new scan
    pub fn try_begin_scan(&self, kind: Option<ScanKind>) -> Result<()> {
        let mut state = self.scan.lock();
        if state.checking {
            return Err(Error::ScanAlreadyRunning);
        }
        *state = ScanState {
            checking: true,
            progress: 0,
            error: None,
            kind,
        };
        Ok(())
    }

    pub fn set_scan_progress(&self, progress: u8) {
        self.scan.lock().progress = progress.min(100);
    }

    /// Terminal scan state from the process exit code
    pub fn finish_scan(&self, code: i32) {
        let mut state = self.scan.lock();
        state.checking = false;
        if code == 0 {
            state.progress = 100;
        } else {
            state.error = Some(format!("Parity check failed (exit code {})", code));
        }
    }

    /// Release a claimed scan record when the process never started
    pub fn abort_scan(&self, message: String) {
        let mut state = self.scan.lock();
        state.checking = false;
        state.error = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_provisioning_claim_is_exclusive() {
        let board = StatusBoard::new();
        board.try_begin_provisioning().unwrap();
        assert_matches!(
            board.try_begin_provisioning(),
            Err(Error::ProvisioningActive)
        );

        // Completion releases the claim
        board.complete_provisioning();
        board.try_begin_provisioning().unwrap();
    }

    #[test]
    fn test_provisioning_reset_on_claim() {
        let board = StatusBoard::new();
        board.try_begin_provisioning().unwrap();
        board.fail_provisioning("mkfs exploded".into());
        assert!(board.provisioning().error.is_some());

        board.try_begin_provisioning().unwrap();
        let state = board.provisioning();
        assert!(state.active);
        assert_eq!(state.step, Some(ProvisioningStep::Partition));
        assert_eq!(state.progress, 0);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_step_transition_resets_progress() {
        let board = StatusBoard::new();
        board.try_begin_provisioning().unwrap();
        board.set_progress(80);
        board.begin_step(ProvisioningStep::Array);
        let state = board.provisioning();
        assert_eq!(state.step, Some(ProvisioningStep::Array));
        assert_eq!(state.progress, 0);
    }

    #[test]
    fn test_progress_is_clamped() {
        let board = StatusBoard::new();
        board.try_begin_provisioning().unwrap();
        board.set_progress(250);
        assert_eq!(board.provisioning().progress, 100);

        board.try_begin_scan(None).unwrap();
        board.set_scan_progress(101);
        assert_eq!(board.scan().progress, 100);
    }

    #[test]
    fn test_scan_claim_is_exclusive() {
        let board = StatusBoard::new();
        board.try_begin_scan(None).unwrap();
        assert_matches!(board.try_begin_scan(None), Err(Error::ScanAlreadyRunning));

        board.finish_scan(0);
        board.try_begin_scan(Some(ScanKind::Rebuild)).unwrap();
        assert_eq!(board.scan().kind, Some(ScanKind::Rebuild));
    }

    #[test]
    fn test_finish_scan_outcomes() {
        let board = StatusBoard::new();
        board.try_begin_scan(None).unwrap();
        board.set_scan_progress(60);
        board.finish_scan(0);
        let state = board.scan();
        assert!(!state.checking);
        assert_eq!(state.progress, 100);
        assert!(state.error.is_none());

        board.try_begin_scan(None).unwrap();
        board.set_scan_progress(42);
        board.finish_scan(2);
        let state = board.scan();
        assert!(!state.checking);
        assert_eq!(state.progress, 42);
        assert!(state.error.unwrap().contains("exit code 2"));
    }

    #[test]
    fn test_failure_keeps_last_step() {
        let board = StatusBoard::new();
        board.try_begin_provisioning().unwrap();
        board.begin_step(ProvisioningStep::Filesystem);
        board.fail_provisioning("format failed".into());
        let state = board.provisioning();
        assert!(!state.active);
        assert_eq!(state.step, Some(ProvisioningStep::Filesystem));
        assert_eq!(state.error.as_deref(), Some("format failed"));
    }
}
