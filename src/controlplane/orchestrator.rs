//! Provisioning orchestrator
//!
//! Runs the ordered pipeline that turns a set of raw disks into a running,
//! shared parity array: partition, assemble, start, format, mount, share,
//! and an initial parity check. The triggering request returns as soon as
//! the run is accepted; progress is observed by polling the provisioning
//! record, which only this component writes.
//!
//! Also hosts the synchronous array operations (start, stop, add a disk,
//! replace a disk) which complete within the request.

use crate::controlplane::scan::ScanSupervisor;
use crate::controlplane::state::StatusBoard;
use crate::domain::model::{ProvisioningStep, ScanKind, ShareMode};
use crate::domain::ports::{CommandOutput, CommandRunnerRef};
use crate::error::{Error, Result};
use crate::hardware::array::{ArrayConfig, ArrayStatusReader};
use crate::hardware::inventory::DiskInventory;
use crate::shares::samba::ShareConfigWriter;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// =============================================================================
// Constants
// =============================================================================

/// Single full-device partition, 32K-aligned for the array tool
const PARTITION_ARGS: [&str; 5] = ["-o", "-a", "8", "-n", "1:32K:0"];

// =============================================================================
// Orchestrator Configuration
// =============================================================================

/// Configuration for the provisioning orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Array paths and tool names
    pub array: ArrayConfig,
    /// Disk partitioner binary
    pub partition_tool: String,
    /// Filesystem formatter for data-disk devices
    pub filesystem_tool: String,
    /// Service manager used to reload the share daemon
    pub service_tool: String,
    /// Share daemon service unit
    pub share_daemon: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            array: ArrayConfig::default(),
            partition_tool: "sgdisk".to_string(),
            filesystem_tool: "mkfs.xfs".to_string(),
            service_tool: "systemctl".to_string(),
            share_daemon: "smbd".to_string(),
        }
    }
}

// =============================================================================
// Provisioning Plan
// =============================================================================

/// Validated input for one provisioning run
#[derive(Debug, Clone)]
struct ProvisionPlan {
    data_disks: Vec<String>,
    parity_disk: String,
    share_mode: ShareMode,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives the provisioning pipeline and the synchronous array operations
pub struct ArrayOrchestrator {
    config: OrchestratorConfig,
    runner: CommandRunnerRef,
    board: Arc<StatusBoard>,
    scan: Arc<ScanSupervisor>,
    shares: Arc<ShareConfigWriter>,
    inventory: Arc<DiskInventory>,
    reader: Arc<ArrayStatusReader>,
    /// Token for the active run, if any
    cancel: Mutex<Option<CancellationToken>>,
}

impl ArrayOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        runner: CommandRunnerRef,
        board: Arc<StatusBoard>,
        scan: Arc<ScanSupervisor>,
        shares: Arc<ShareConfigWriter>,
        inventory: Arc<DiskInventory>,
        reader: Arc<ArrayStatusReader>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            runner,
            board,
            scan,
            shares,
            inventory,
            reader,
            cancel: Mutex::new(None),
        })
    }

    // =========================================================================
    // Provisioning Pipeline
    // =========================================================================

    /// Validate a provisioning request and start the pipeline
    ///
    /// Returns as soon as the run is accepted; the caller polls the
    /// provisioning record for completion. No mutating command runs before
    /// validation passes, and only one run can be active at a time.
    pub async fn configure(
        self: Arc<Self>,
        data_disks: Vec<String>,
        parity_disks: Vec<String>,
        share_mode: ShareMode,
    ) -> Result<()> {
        if data_disks.is_empty() {
            return Err(Error::Validation("At least one data disk required".into()));
        }
        let parity_disk = match parity_disks.as_slice() {
            [] => return Err(Error::Validation("Parity disk required".into())),
            [single] => single.clone(),
            _ => {
                return Err(Error::Validation(
                    "The array supports exactly one parity disk".into(),
                ))
            }
        };

        let mut selection: Vec<&str> = data_disks.iter().map(String::as_str).collect();
        selection.push(parity_disk.as_str());
        let unique: HashSet<&str> = selection.iter().copied().collect();
        if unique.len() != selection.len() {
            return Err(Error::Validation(
                "The same disk was selected more than once".into(),
            ));
        }
        self.validate_unmounted(&selection).await?;

        self.board.try_begin_provisioning()?;

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());

        info!(
            "Provisioning accepted: {} data disk(s), parity {}, {} shares",
            data_disks.len(),
            parity_disk,
            share_mode
        );

        let plan = ProvisionPlan {
            data_disks,
            parity_disk,
            share_mode,
        };
        tokio::spawn(async move {
            if let Err(e) = self.run_pipeline(plan, token).await {
                warn!("Provisioning failed: {}", e);
                self.board.fail_provisioning(e.to_string());
            }
        });

        Ok(())
    }

    /// Snapshot of the provisioning record
    pub fn progress(&self) -> crate::domain::model::ProvisioningState {
        self.board.provisioning()
    }

    /// Cancel the active provisioning run, if any
    ///
    /// The pipeline stops at the next command boundary; a subprocess that
    /// is already running is left to finish on its own.
    pub fn cancel_provisioning(&self) -> Result<()> {
        if !self.board.provisioning().active {
            return Err(Error::Validation("No active provisioning run".into()));
        }
        match self.cancel.lock().as_ref() {
            Some(token) => {
                info!("Provisioning cancellation requested");
                token.cancel();
                Ok(())
            }
            None => Err(Error::Validation("No active provisioning run".into())),
        }
    }

    async fn run_pipeline(&self, plan: ProvisionPlan, cancel: CancellationToken) -> Result<()> {
        let data_count = plan.data_disks.len();

        // Step 1: partition every disk, data first, parity last
        self.board.begin_step(ProvisioningStep::Partition);
        let all_disks: Vec<&String> = plan
            .data_disks
            .iter()
            .chain(std::iter::once(&plan.parity_disk))
            .collect();
        for (index, disk) in all_disks.iter().enumerate() {
            let mut args = PARTITION_ARGS.to_vec();
            args.push(disk.as_str());
            self.step_command(&cancel, &self.config.partition_tool, &args)
                .await?;
            self.board
                .set_progress(scaled(index + 1, all_disks.len(), 100));
        }

        // Step 2: assemble the array, parity partition first
        self.board.begin_step(ProvisioningStep::Array);
        let parity_partition = self.config.array.partition_of(&plan.parity_disk);
        let data_partitions: Vec<String> = plan
            .data_disks
            .iter()
            .map(|d| self.config.array.partition_of(d))
            .collect();
        let mut args: Vec<&str> = vec!["create", "-p", &parity_partition];
        args.extend(data_partitions.iter().map(String::as_str));
        self.step_command(&cancel, &self.config.array.tool, &args)
            .await?;
        self.board.set_progress(100);

        // Step 3: bring the array online
        self.board.begin_step(ProvisioningStep::Start);
        self.step_command(&cancel, &self.config.array.tool, &["start"])
            .await?;
        self.board.set_progress(100);

        // Step 4: format each data slot's exposed array device
        self.board.begin_step(ProvisioningStep::Filesystem);
        for index in 0..data_count {
            let device = self.config.array.slot_device(index as u32 + 1);
            self.step_command(&cancel, &self.config.filesystem_tool, &["-f", &device])
                .await?;
            self.board.set_progress(scaled(index + 1, data_count, 100));
        }

        // Step 5: create mount points, then mount the whole array
        self.board.begin_step(ProvisioningStep::Mount);
        for index in 0..data_count {
            let mount_point = self.config.array.slot_mount(index as u32 + 1);
            self.step_command(&cancel, "mkdir", &["-p", &mount_point])
                .await?;
            self.board.set_progress(scaled(index + 1, data_count, 50));
        }
        self.step_command(&cancel, &self.config.array.tool, &["mount"])
            .await?;
        self.board.set_progress(100);

        // Step 6: install the share configuration and reload the daemon
        self.board.begin_step(ProvisioningStep::Samba);
        if cancel.is_cancelled() {
            return Err(self.cancellation());
        }
        self.shares.apply(data_count as u32, plan.share_mode).await?;
        self.step_command(
            &cancel,
            &self.config.service_tool,
            &["restart", &self.config.share_daemon],
        )
        .await?;
        self.board.set_progress(100);

        // Step 7: initial parity check; the supervisor mirrors progress
        // into the provisioning record and completes it on exit
        self.board.begin_step(ProvisioningStep::Check);
        self.scan.start(None, true).await?;

        Ok(())
    }

    /// Run one pipeline command, racing it against cancellation
    async fn step_command(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput> {
        if cancel.is_cancelled() {
            return Err(self.cancellation());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(self.cancellation()),
            result = self.runner.run_privileged(program, args) => result,
        }
    }

    fn cancellation(&self) -> Error {
        let step = self
            .board
            .provisioning()
            .step
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Error::Cancelled { step }
    }

    // =========================================================================
    // Synchronous Array Operations
    // =========================================================================

    /// Bring the array online and mount all slots
    pub async fn start_array(&self) -> Result<()> {
        self.runner
            .run_privileged(&self.config.array.tool, &["start"])
            .await?;
        self.runner
            .run_privileged(&self.config.array.tool, &["mount"])
            .await?;
        info!("Array started");
        Ok(())
    }

    /// Unmount all slots and take the array offline
    pub async fn stop_array(&self) -> Result<()> {
        self.runner
            .run_privileged(&self.config.array.tool, &["unmount"])
            .await?;
        self.runner
            .run_privileged(&self.config.array.tool, &["stop"])
            .await?;
        info!("Array stopped");
        Ok(())
    }

    /// Add a disk to the array; returns the assigned slot
    pub async fn add_disk(&self, disk: &str) -> Result<u32> {
        if disk.is_empty() {
            return Err(Error::Validation("Disk path required".into()));
        }
        self.validate_unmounted(&[disk]).await?;

        self.partition_disk(disk).await?;
        let partition = self.config.array.partition_of(disk);
        self.runner
            .run_privileged(&self.config.array.tool, &["add", &partition])
            .await?;

        // The tool assigns the next slot; read it back
        let status = self.reader.tool_status().await?;
        let slot = status.data_disks;

        let device = self.config.array.slot_device(slot);
        self.runner
            .run_privileged(&self.config.filesystem_tool, &["-f", &device])
            .await?;

        let mount_point = self.config.array.slot_mount(slot);
        self.runner
            .run_privileged("mkdir", &["-p", &mount_point])
            .await?;
        self.runner
            .run_privileged("mount", &[&device, &mount_point])
            .await?;

        info!("Disk {} added as slot {}", disk, slot);
        Ok(slot)
    }

    /// Replace the disk in a slot; starts a supervised rebuild scan
    pub async fn replace_disk(&self, slot: u32, disk: &str) -> Result<()> {
        if disk.is_empty() {
            return Err(Error::Validation("New disk path required".into()));
        }
        if self.board.scan().checking {
            return Err(Error::ScanAlreadyRunning);
        }
        self.validate_unmounted(&[disk]).await?;

        self.partition_disk(disk).await?;
        let partition = self.config.array.partition_of(disk);
        let slot_arg = slot.to_string();
        self.runner
            .run_privileged(&self.config.array.tool, &["replace", &slot_arg, &partition])
            .await?;

        info!("Disk {} replacing slot {}, rebuild starting", disk, slot);
        self.scan.start(Some(ScanKind::Rebuild), false).await?;
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn partition_disk(&self, disk: &str) -> Result<()> {
        let mut args = PARTITION_ARGS.to_vec();
        args.push(disk);
        self.runner
            .run_privileged(&self.config.partition_tool, &args)
            .await?;
        Ok(())
    }

    /// Reject disks that are unknown to the inventory or carry mounts
    async fn validate_unmounted(&self, selection: &[&str]) -> Result<()> {
        let disks = self.inventory.list_disks().await?;
        for path in selection {
            match disks.iter().find(|d| d.path == *path) {
                None => {
                    return Err(Error::Validation(format!("Unknown disk: {}", path)));
                }
                Some(disk) if disk.mounted => {
                    return Err(Error::Validation(format!(
                        "Disk {} has mounted filesystems",
                        path
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Round `done / total` onto a 0..=scale range
fn scaled(done: usize, total: usize, scale: usize) -> u8 {
    ((done * scale * 2 + total) / (total * 2)) as u8
}
