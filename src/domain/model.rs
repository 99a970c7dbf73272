//! Core data model for the array operator
//!
//! Snapshot types produced by the status readers and the two process-wide
//! status records mutated by the orchestrator and the scan supervisor.
//! Everything here serializes in the camelCase shape the dashboard consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Disk Inventory
// =============================================================================

/// A partition on a physical disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionDescriptor {
    /// Kernel name (e.g., sdb1)
    pub name: String,
    /// Device path (e.g., /dev/sdb1)
    pub path: String,
    /// Size as reported by the OS (raw string, e.g. "1.8T")
    pub size: String,
    /// Mountpoint, if mounted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
}

/// A physical disk as reported by the block device enumerator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskDescriptor {
    /// Kernel name (e.g., sdb)
    pub name: String,
    /// Device path (e.g., /dev/sdb)
    pub path: String,
    /// Size as reported by the OS (raw string)
    pub size: String,
    /// Model name
    pub model: String,
    /// Serial number
    pub serial: String,
    /// Spinning rust vs solid state
    pub rotational: bool,
    /// True if the disk or any of its partitions is mounted
    pub mounted: bool,
    /// Partitions in device order
    pub partitions: Vec<PartitionDescriptor>,
}

// =============================================================================
// Array Status
// =============================================================================

/// Lifecycle state of the parity array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArrayState {
    NotInstalled,
    NotConfigured,
    Running,
    Stopped,
    Degraded,
    Rebuilding,
}

impl std::fmt::Display for ArrayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArrayState::NotInstalled => write!(f, "NOT_INSTALLED"),
            ArrayState::NotConfigured => write!(f, "NOT_CONFIGURED"),
            ArrayState::Running => write!(f, "RUNNING"),
            ArrayState::Stopped => write!(f, "STOPPED"),
            ArrayState::Degraded => write!(f, "DEGRADED"),
            ArrayState::Rebuilding => write!(f, "REBUILDING"),
        }
    }
}

/// Marker for a slot whose filesystem usage could not be queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Unmounted,
}

/// Usage figures for a mounted data-disk slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountedSlot {
    /// 1-based position within the array
    pub slot: u32,
    pub mount_point: String,
    pub device: String,
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub usage_percent: u8,
}

/// A slot whose mount could not be queried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmountedSlot {
    pub slot: u32,
    pub mount_point: String,
    pub status: SlotState,
}

/// Per-slot usage entry in an array snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotUsage {
    Mounted(MountedSlot),
    Unmounted(UnmountedSlot),
}

impl SlotUsage {
    pub fn slot(&self) -> u32 {
        match self {
            SlotUsage::Mounted(m) => m.slot,
            SlotUsage::Unmounted(u) => u.slot,
        }
    }

    pub fn is_mounted(&self) -> bool {
        matches!(self, SlotUsage::Mounted(_))
    }
}

/// Point-in-time view of the array, derived from external tool output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArraySnapshot {
    pub installed: bool,
    pub configured: bool,
    pub status: ArrayState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parity_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parity_disk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_disks: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<SlotUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    /// Live scan state, merged in so the dashboard needs one round trip
    pub checking: bool,
    pub check_progress: u8,
}

impl ArraySnapshot {
    /// Snapshot for a host without the array tool installed
    pub fn not_installed() -> Self {
        Self {
            installed: false,
            configured: false,
            status: ArrayState::NotInstalled,
            parity_valid: None,
            parity_disk: None,
            data_disks: None,
            disks: Vec::new(),
            last_check: None,
            checking: false,
            check_progress: 0,
        }
    }

    /// Snapshot for an installed tool with no array descriptor on disk
    pub fn not_configured() -> Self {
        Self {
            installed: true,
            status: ArrayState::NotConfigured,
            ..Self::not_installed()
        }
    }
}

// =============================================================================
// Share Configuration
// =============================================================================

/// Layout of the network shares exported over the array
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareMode {
    /// One share per data-disk slot
    #[default]
    Individual,
    /// One share over a union mount of all slots
    Merged,
    /// One share per slot, named from a fixed category list
    Categories,
}

impl std::fmt::Display for ShareMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShareMode::Individual => write!(f, "individual"),
            ShareMode::Merged => write!(f, "merged"),
            ShareMode::Categories => write!(f, "categories"),
        }
    }
}

/// A share parsed back from the live daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareInfo {
    pub name: String,
    pub path: String,
}

// =============================================================================
// Provisioning Status
// =============================================================================

/// Steps of the provisioning pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningStep {
    Partition,
    Array,
    Start,
    Filesystem,
    Mount,
    Samba,
    Check,
    Complete,
}

impl std::fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisioningStep::Partition => write!(f, "partition"),
            ProvisioningStep::Array => write!(f, "array"),
            ProvisioningStep::Start => write!(f, "start"),
            ProvisioningStep::Filesystem => write!(f, "filesystem"),
            ProvisioningStep::Mount => write!(f, "mount"),
            ProvisioningStep::Samba => write!(f, "samba"),
            ProvisioningStep::Check => write!(f, "check"),
            ProvisioningStep::Complete => write!(f, "complete"),
        }
    }
}

/// Progress record for the provisioning pipeline
///
/// Written only by the orchestrator; readers get cloned snapshots. `step`
/// is absent until the first run is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningState {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<ProvisioningStep>,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// =============================================================================
// Scan Status
// =============================================================================

/// What kind of scan the supervisor is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanKind {
    /// Routine data-vs-parity verification
    #[serde(rename = "check")]
    Check,
    /// Reconstruction after a disk replacement
    #[serde(rename = "rebuilding")]
    Rebuild,
}

impl std::fmt::Display for ScanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanKind::Check => write!(f, "check"),
            ScanKind::Rebuild => write!(f, "rebuilding"),
        }
    }
}

/// Progress record for the background integrity scan
///
/// Written only by the scan supervisor. `kind` is set when the scan was
/// triggered by a disk replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanState {
    pub checking: bool,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "step", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ScanKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_state_wire_format() {
        assert_eq!(
            serde_json::to_string(&ArrayState::NotInstalled).unwrap(),
            "\"NOT_INSTALLED\""
        );
        assert_eq!(
            serde_json::to_string(&ArrayState::Running).unwrap(),
            "\"RUNNING\""
        );
        let state: ArrayState = serde_json::from_str("\"DEGRADED\"").unwrap();
        assert_eq!(state, ArrayState::Degraded);
    }

    #[test]
    fn test_step_wire_format() {
        assert_eq!(
            serde_json::to_string(&ProvisioningStep::Filesystem).unwrap(),
            "\"filesystem\""
        );
        let step: ProvisioningStep = serde_json::from_str("\"samba\"").unwrap();
        assert_eq!(step, ProvisioningStep::Samba);
    }

    #[test]
    fn test_step_ordering() {
        assert!(ProvisioningStep::Partition < ProvisioningStep::Array);
        assert!(ProvisioningStep::Samba < ProvisioningStep::Check);
        assert!(ProvisioningStep::Check < ProvisioningStep::Complete);
    }

    #[test]
    fn test_slot_usage_shapes() {
        let mounted = SlotUsage::Mounted(MountedSlot {
            slot: 1,
            mount_point: "/mnt/disk1".into(),
            device: "/dev/nmd1p1".into(),
            total: 1000,
            used: 400,
            available: 600,
            usage_percent: 40,
        });
        let json = serde_json::to_value(&mounted).unwrap();
        assert_eq!(json["slot"], 1);
        assert_eq!(json["usagePercent"], 40);
        assert!(json.get("status").is_none());

        let unmounted = SlotUsage::Unmounted(UnmountedSlot {
            slot: 2,
            mount_point: "/mnt/disk2".into(),
            status: SlotState::Unmounted,
        });
        let json = serde_json::to_value(&unmounted).unwrap();
        assert_eq!(json["status"], "unmounted");
        assert!(json.get("device").is_none());
    }

    #[test]
    fn test_share_mode_default_and_parse() {
        assert_eq!(ShareMode::default(), ShareMode::Individual);
        let mode: ShareMode = serde_json::from_str("\"merged\"").unwrap();
        assert_eq!(mode, ShareMode::Merged);
        assert!(serde_json::from_str::<ShareMode>("\"striped\"").is_err());
    }

    #[test]
    fn test_scan_kind_label() {
        let state = ScanState {
            checking: true,
            progress: 10,
            error: None,
            kind: Some(ScanKind::Rebuild),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["step"], "rebuilding");
    }

    #[test]
    fn test_idle_provisioning_state_serialization() {
        let state = ProvisioningState::default();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["active"], false);
        assert_eq!(json["progress"], 0);
        assert!(json.get("step").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_snapshot_constructors() {
        let s = ArraySnapshot::not_installed();
        assert!(!s.installed);
        assert_eq!(s.status, ArrayState::NotInstalled);

        let s = ArraySnapshot::not_configured();
        assert!(s.installed);
        assert!(!s.configured);
        assert_eq!(s.status, ArrayState::NotConfigured);
    }
}
