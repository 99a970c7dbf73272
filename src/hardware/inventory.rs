//! Disk inventory reader
//!
//! Enumerates physical disks through the OS block device enumerator
//! (`lsblk -J`) and maps them into [`DiskDescriptor`] snapshots. Pure
//! read; no state is kept between queries.

use crate::domain::model::{DiskDescriptor, PartitionDescriptor};
use crate::domain::ports::CommandRunnerRef;
use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer};
use tracing::debug;

// =============================================================================
// Constants
// =============================================================================

const LSBLK_COLUMNS: &str = "NAME,SIZE,TYPE,MOUNTPOINT,MODEL,SERIAL,ROTA";

// =============================================================================
// Inventory Configuration
// =============================================================================

/// Configuration for the disk inventory reader
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    /// Block device enumerator binary
    pub tool: String,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            tool: "lsblk".to_string(),
        }
    }
}

// =============================================================================
// lsblk Output
// =============================================================================

#[derive(Debug, Deserialize)]
struct LsblkReport {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    serial: Option<String>,
    #[serde(default, deserialize_with = "flag_or_bool")]
    rota: bool,
    #[serde(default)]
    children: Vec<LsblkChild>,
}

#[derive(Debug, Deserialize)]
struct LsblkChild {
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
}

/// Older lsblk versions emit "0"/"1" strings where newer ones emit booleans
fn flag_or_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Text(t)) => t == "1" || t.eq_ignore_ascii_case("true"),
        None => false,
    })
}

// =============================================================================
// Disk Inventory
// =============================================================================

/// Reads the host's physical disk inventory
pub struct DiskInventory {
    config: InventoryConfig,
    runner: CommandRunnerRef,
}

impl DiskInventory {
    pub fn new(config: InventoryConfig, runner: CommandRunnerRef) -> Self {
        Self { config, runner }
    }

    /// List physical disks, newest snapshot every call
    pub async fn list_disks(&self) -> Result<Vec<DiskDescriptor>> {
        let output = self
            .runner
            .run(&self.config.tool, &["-J", "-o", LSBLK_COLUMNS])
            .await?;

        let report: LsblkReport = serde_json::from_str(&output.stdout)
            .map_err(|e| Error::Parse(format!("block device listing: {}", e)))?;

        let disks: Vec<DiskDescriptor> = report
            .blockdevices
            .into_iter()
            .filter(|d| d.kind == "disk" && !is_virtual_device(&d.name))
            .map(describe_disk)
            .collect();

        debug!("Inventory found {} physical disks", disks.len());
        Ok(disks)
    }
}

fn describe_disk(device: LsblkDevice) -> DiskDescriptor {
    let mounted = device.mountpoint.is_some()
        || device.children.iter().any(|c| c.mountpoint.is_some());

    let partitions = device
        .children
        .into_iter()
        .map(|c| PartitionDescriptor {
            path: format!("/dev/{}", c.name),
            name: c.name,
            size: c.size.unwrap_or_default(),
            mountpoint: c.mountpoint,
        })
        .collect();

    DiskDescriptor {
        path: format!("/dev/{}", device.name),
        name: device.name,
        size: device.size.unwrap_or_default(),
        model: device
            .model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        serial: device
            .serial
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "N/A".to_string()),
        rotational: device.rota,
        mounted,
        partitions,
    }
}

/// Virtual and pseudo devices are never provisioning candidates
fn is_virtual_device(name: &str) -> bool {
    name.starts_with("loop")
        || name.starts_with("ram")
        || name.starts_with("zram")
        || name.starts_with("dm-")
        || name.starts_with("md")
}
