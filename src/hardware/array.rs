//! Array status reader
//!
//! Composes a point-in-time [`ArraySnapshot`] from the array management
//! tool, the on-disk array descriptor, and per-slot filesystem usage.
//! A missing tool or descriptor is a benign state, not an error; only a
//! failing structured status query is fatal.

use crate::domain::model::{
    ArraySnapshot, ArrayState, MountedSlot, ScanState, SlotState, SlotUsage, UnmountedSlot,
};
use crate::domain::ports::CommandRunnerRef;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

// =============================================================================
// Array Configuration
// =============================================================================

/// Paths and tool names describing the array installation
#[derive(Debug, Clone)]
pub struct ArrayConfig {
    /// Array management binary
    pub tool: String,
    /// On-disk array descriptor; existence means "configured"
    pub descriptor_path: PathBuf,
    /// Per-slot mount path prefix (slot number is appended)
    pub mount_prefix: String,
    /// Array block device prefix (slot number and partition suffix appended)
    pub device_prefix: String,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            tool: "nmdctl".to_string(),
            descriptor_path: PathBuf::from("/nonraid.dat"),
            mount_prefix: "/mnt/disk".to_string(),
            device_prefix: "/dev/nmd".to_string(),
        }
    }
}

impl ArrayConfig {
    /// Conventional mount point for a 1-based slot
    pub fn slot_mount(&self, slot: u32) -> String {
        format!("{}{}", self.mount_prefix, slot)
    }

    /// Array block device exposed for a 1-based slot
    pub fn slot_device(&self, slot: u32) -> String {
        format!("{}{}p1", self.device_prefix, slot)
    }

    /// First partition of a raw disk (e.g. /dev/sdb -> /dev/sdb1)
    pub fn partition_of(&self, disk: &str) -> String {
        format!("{}1", disk)
    }
}

// =============================================================================
// Tool Output
// =============================================================================

/// Structured status as reported by the array tool
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayToolStatus {
    pub state: ArrayState,
    #[serde(default)]
    pub parity_valid: bool,
    #[serde(default)]
    pub parity_disk: Option<String>,
    pub data_disks: u32,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
}

// =============================================================================
// Array Status Reader
// =============================================================================

/// Reads array state from the external array tool
pub struct ArrayStatusReader {
    config: ArrayConfig,
    runner: CommandRunnerRef,
}

impl ArrayStatusReader {
    pub fn new(config: ArrayConfig, runner: CommandRunnerRef) -> Self {
        Self { config, runner }
    }

    /// Compose a snapshot, merging in the live scan record
    pub async fn snapshot(&self, scan: ScanState) -> Result<ArraySnapshot> {
        // Tool presence probe; absence is a state, not an error
        if self
            .runner
            .run("which", &[self.config.tool.as_str()])
            .await
            .is_err()
        {
            debug!("Array tool {} not installed", self.config.tool);
            return Ok(ArraySnapshot::not_installed());
        }

        // Descriptor probe; the array has never been configured without it
        let configured = tokio::fs::try_exists(&self.config.descriptor_path)
            .await
            .unwrap_or(false);
        if !configured {
            return Ok(ArraySnapshot::not_configured());
        }

        let status = self.tool_status().await?;

        let mut disks = Vec::with_capacity(status.data_disks as usize);
        for slot in 1..=status.data_disks {
            disks.push(self.slot_usage(slot).await);
        }

        Ok(ArraySnapshot {
            installed: true,
            configured: true,
            status: status.state,
            parity_valid: Some(status.parity_valid),
            parity_disk: status.parity_disk,
            data_disks: Some(status.data_disks),
            disks,
            last_check: status.last_check,
            checking: scan.checking,
            check_progress: scan.progress,
        })
    }

    /// Query the tool's structured status; fatal when it fails
    pub async fn tool_status(&self) -> Result<ArrayToolStatus> {
        let output = self
            .runner
            .run_privileged(&self.config.tool, &["status", "-o", "json"])
            .await
            .map_err(|e| Error::StatusQuery(e.to_string()))?;

        serde_json::from_str(&output.stdout)
            .map_err(|e| Error::Parse(format!("array status output: {}", e)))
    }

    /// Usage for one slot; a query failure degrades to an unmounted marker
    async fn slot_usage(&self, slot: u32) -> SlotUsage {
        let mount_point = self.config.slot_mount(slot);
        match self.query_usage(&mount_point).await {
            Ok((device, total, used, available, usage_percent)) => {
                SlotUsage::Mounted(MountedSlot {
                    slot,
                    mount_point,
                    device,
                    total,
                    used,
                    available,
                    usage_percent,
                })
            }
            Err(e) => {
                warn!("Usage query for slot {} failed: {}", slot, e);
                SlotUsage::Unmounted(UnmountedSlot {
                    slot,
                    mount_point,
                    status: SlotState::Unmounted,
                })
            }
        }
    }

    async fn query_usage(&self, mount_point: &str) -> Result<(String, u64, u64, u64, u8)> {
        let output = self.runner.run("df", &["-B1", mount_point]).await?;
        parse_df_output(&output.stdout)
            .ok_or_else(|| Error::Parse(format!("df output for {}", mount_point)))
    }
}

/// Parse the data row of `df -B1` output: device, total, used, available,
/// usage percent
fn parse_df_output(stdout: &str) -> Option<(String, u64, u64, u64, u8)> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return None;
    }

    let device = fields[0].to_string();
    let total: u64 = fields[1].parse().ok()?;
    let used: u64 = fields[2].parse().ok()?;
    let available: u64 = fields[3].parse().ok()?;
    let usage_percent: u8 = fields[4].trim_end_matches('%').parse().ok()?;

    Some((device, total, used, available, usage_percent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::script::ScriptedRunner;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    const STATUS_CMD: &str = "nmdctl status -o json";

    fn reader_with(descriptor: PathBuf, runner: Arc<ScriptedRunner>) -> ArrayStatusReader {
        ArrayStatusReader::new(
            ArrayConfig {
                descriptor_path: descriptor,
                ..ArrayConfig::default()
            },
            runner,
        )
    }

    fn running_status() -> &'static str {
        r#"{"state": "RUNNING", "parityValid": true,
            "parityDisk": "/dev/sdd1", "dataDisks": 2,
            "lastCheck": "2026-08-01T02:00:00Z"}"#
    }

    #[test]
    fn test_config_paths() {
        let config = ArrayConfig::default();
        assert_eq!(config.slot_mount(3), "/mnt/disk3");
        assert_eq!(config.slot_device(2), "/dev/nmd2p1");
        assert_eq!(config.partition_of("/dev/sdb"), "/dev/sdb1");
    }

    #[test]
    fn test_parse_df_output() {
        let out = "Filesystem 1B-blocks Used Available Use% Mounted on\n\
                   /dev/nmd1p1 2000000000 500000000 1500000000 25% /mnt/disk1\n";
        let (device, total, used, available, pct) = parse_df_output(out).unwrap();
        assert_eq!(device, "/dev/nmd1p1");
        assert_eq!(total, 2_000_000_000);
        assert_eq!(used, 500_000_000);
        assert_eq!(available, 1_500_000_000);
        assert_eq!(pct, 25);

        assert!(parse_df_output("").is_none());
        assert!(parse_df_output("garbage line\n").is_none());
    }

    #[tokio::test]
    async fn test_snapshot_not_installed() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_failure("which nmdctl", 1, "");
        let reader = reader_with(PathBuf::from("/nonexistent/nonraid.dat"), runner);

        let snapshot = reader.snapshot(ScanState::default()).await.unwrap();
        assert_eq!(snapshot, ArraySnapshot::not_installed());
    }

    #[tokio::test]
    async fn test_snapshot_not_configured() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_stdout("which nmdctl", "/usr/bin/nmdctl");
        let dir = tempfile::tempdir().unwrap();
        let reader = reader_with(dir.path().join("nonraid.dat"), runner);

        let snapshot = reader.snapshot(ScanState::default()).await.unwrap();
        assert_eq!(snapshot, ArraySnapshot::not_configured());
    }

    #[tokio::test]
    async fn test_snapshot_with_degraded_slot() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_stdout("which nmdctl", "/usr/bin/nmdctl");
        runner.on_stdout(STATUS_CMD, running_status());
        runner.on_stdout(
            "df -B1 /mnt/disk1",
            "Filesystem 1B-blocks Used Available Use% Mounted on\n\
             /dev/nmd1p1 1000 400 600 40% /mnt/disk1\n",
        );
        runner.on_failure("df -B1 /mnt/disk2", 1, "no such file or directory");

        let dir = tempfile::tempdir().unwrap();
        let descriptor = dir.path().join("nonraid.dat");
        std::fs::write(&descriptor, b"").unwrap();
        let reader = reader_with(descriptor, runner);

        let scan = ScanState {
            checking: true,
            progress: 37,
            ..ScanState::default()
        };
        let snapshot = reader.snapshot(scan).await.unwrap();

        assert!(snapshot.installed && snapshot.configured);
        assert_eq!(snapshot.status, ArrayState::Running);
        assert_eq!(snapshot.parity_valid, Some(true));
        assert_eq!(snapshot.parity_disk.as_deref(), Some("/dev/sdd1"));
        assert_eq!(snapshot.data_disks, Some(2));
        assert_eq!(snapshot.disks.len(), 2);
        assert!(snapshot.disks[0].is_mounted());
        assert!(!snapshot.disks[1].is_mounted());
        assert_eq!(snapshot.disks[1].slot(), 2);
        assert!(snapshot.checking);
        assert_eq!(snapshot.check_progress, 37);
    }

    #[tokio::test]
    async fn test_snapshot_is_idempotent() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_stdout("which nmdctl", "/usr/bin/nmdctl");
        runner.on_stdout(STATUS_CMD, running_status());
        runner.on_stdout(
            "df -B1 /mnt/disk1",
            "/dev/nmd1p1 1000 400 600 40% /mnt/disk1\n",
        );
        runner.on_stdout(
            "df -B1 /mnt/disk2",
            "/dev/nmd2p1 1000 100 900 10% /mnt/disk2\n",
        );

        let dir = tempfile::tempdir().unwrap();
        let descriptor = dir.path().join("nonraid.dat");
        std::fs::write(&descriptor, b"").unwrap();
        let reader = reader_with(descriptor, runner);

        let first = reader.snapshot(ScanState::default()).await.unwrap();
        let second = reader.snapshot(ScanState::default()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_snapshot_status_query_fatal() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_stdout("which nmdctl", "/usr/bin/nmdctl");
        runner.on_failure(STATUS_CMD, 1, "cannot open array");

        let dir = tempfile::tempdir().unwrap();
        let descriptor = dir.path().join("nonraid.dat");
        std::fs::write(&descriptor, b"").unwrap();
        let reader = reader_with(descriptor, runner);

        let err = reader.snapshot(ScanState::default()).await.unwrap_err();
        assert_matches!(err, Error::StatusQuery(_));
    }

    #[tokio::test]
    async fn test_snapshot_malformed_status_output() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_stdout("which nmdctl", "/usr/bin/nmdctl");
        runner.on_stdout(STATUS_CMD, "plain text, not json");

        let dir = tempfile::tempdir().unwrap();
        let descriptor = dir.path().join("nonraid.dat");
        std::fs::write(&descriptor, b"").unwrap();
        let reader = reader_with(descriptor, runner);

        let err = reader.snapshot(ScanState::default()).await.unwrap_err();
        assert_matches!(err, Error::Parse(_));
    }
}
