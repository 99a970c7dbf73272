//! Share configuration writer
//!
//! Renders the full share daemon configuration (global section plus one
//! section per exported share) and installs it atomically: the text is
//! written to a sibling temporary file and renamed over the live path, so
//! a crash mid-write can never leave a truncated configuration active.
//! The merged layout additionally creates a union mount over all slot
//! mount points before exporting a single share on top of it.
//!
//! The writer never restarts the share daemon; the caller reloads it
//! after a successful install.

use crate::domain::model::{ShareInfo, ShareMode};
use crate::domain::ports::CommandRunnerRef;
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::{debug, info};

// =============================================================================
// Constants
// =============================================================================

/// Share names for the categories layout, assigned in slot order
const CATEGORY_NAMES: [&str; 6] = [
    "Media",
    "Documents",
    "Backups",
    "Downloads",
    "Photos",
    "Projects",
];

/// Union mount policy: most-free-space placement, spill over instead of
/// failing when a member fills up, drop cached entries on close
const MERGERFS_OPTIONS: &str =
    "defaults,allow_other,use_ino,category.create=mfs,moveonenospc=true,dropcacheonclose=true";

// =============================================================================
// Samba Settings
// =============================================================================

/// Settings for the share daemon configuration
#[derive(Debug, Clone)]
pub struct SambaSettings {
    /// Live configuration file, replaced atomically on every apply
    pub conf_path: PathBuf,
    /// Per-slot mount path prefix (slot number is appended)
    pub mount_prefix: String,
    /// Union pool mount path for the merged layout
    pub pool_path: String,
    pub workgroup: String,
    pub server_string: String,
}

impl Default for SambaSettings {
    fn default() -> Self {
        Self {
            conf_path: PathBuf::from("/etc/samba/smb.conf"),
            mount_prefix: "/mnt/disk".to_string(),
            pool_path: "/mnt/storage".to_string(),
            workgroup: "WORKGROUP".to_string(),
            server_string: "HomeNAS".to_string(),
        }
    }
}

// =============================================================================
// Share Configuration Writer
// =============================================================================

/// Renders and installs the share daemon configuration
pub struct ShareConfigWriter {
    settings: SambaSettings,
    runner: CommandRunnerRef,
}

impl ShareConfigWriter {
    pub fn new(settings: SambaSettings, runner: CommandRunnerRef) -> Self {
        Self { settings, runner }
    }

    fn slot_mount(&self, slot: u32) -> String {
        format!("{}{}", self.settings.mount_prefix, slot)
    }

    /// Render the full configuration text for the given layout
    pub fn render(&self, disk_count: u32, mode: ShareMode) -> String {
        let mut config = self.global_section();

        match mode {
            ShareMode::Individual => {
                for slot in 1..=disk_count {
                    config.push_str(&share_section(
                        &format!("Disk{}", slot),
                        &self.slot_mount(slot),
                    ));
                }
            }
            ShareMode::Merged => {
                config.push_str(&share_section("Storage", &self.settings.pool_path));
            }
            ShareMode::Categories => {
                for slot in 1..=disk_count {
                    let name = CATEGORY_NAMES
                        .get(slot as usize - 1)
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| format!("Disk{}", slot));
                    config.push_str(&share_section(&name, &self.slot_mount(slot)));
                }
            }
        }

        config
    }

    /// Render and install the configuration for the given layout
    ///
    /// The merged layout creates the union pool mount first; a failure
    /// there aborts before the live configuration is touched.
    pub async fn apply(&self, disk_count: u32, mode: ShareMode) -> Result<()> {
        info!("Applying share configuration: {} disks, {} layout", disk_count, mode);

        if mode == ShareMode::Merged {
            self.mount_pool(disk_count).await?;
        }

        let text = self.render(disk_count, mode);
        self.install(&text).await
    }

    /// Create the union mount over all slot mount points
    async fn mount_pool(&self, disk_count: u32) -> Result<()> {
        let members = (1..=disk_count)
            .map(|slot| self.slot_mount(slot))
            .collect::<Vec<_>>()
            .join(":");

        self.runner
            .run_privileged("mkdir", &["-p", &self.settings.pool_path])
            .await?;
        self.runner
            .run_privileged(
                "mergerfs",
                &[&members, &self.settings.pool_path, "-o", MERGERFS_OPTIONS],
            )
            .await?;

        Ok(())
    }

    /// Write-to-temporary-then-rename install; never edits the live file
    async fn install(&self, text: &str) -> Result<()> {
        let file_name = self
            .settings
            .conf_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::ShareInstall(format!(
                    "invalid configuration path: {}",
                    self.settings.conf_path.display()
                ))
            })?;
        let staging = self
            .settings
            .conf_path
            .with_file_name(format!("{}.new", file_name));

        tokio::fs::write(&staging, text)
            .await
            .map_err(|e| Error::ShareInstall(format!("write {}: {}", staging.display(), e)))?;
        tokio::fs::rename(&staging, &self.settings.conf_path)
            .await
            .map_err(|e| {
                Error::ShareInstall(format!(
                    "rename {} -> {}: {}",
                    staging.display(),
                    self.settings.conf_path.display(),
                    e
                ))
            })?;

        debug!("Installed share configuration at {}", self.settings.conf_path.display());
        Ok(())
    }

    /// Parse the live configuration back into name/path pairs
    pub async fn list_shares(&self) -> Result<Vec<ShareInfo>> {
        let output = self.runner.run("testparm", &["-s"]).await?;
        Ok(parse_shares(&output.stdout))
    }

    fn global_section(&self) -> String {
        format!(
            r#"[global]
   workgroup = {workgroup}
   server string = {server_string}
   security = user
   map to guest = Bad User
   log file = /var/log/samba/log.%m
   max log size = 1000
   logging = file
   panic action = /usr/share/samba/panic-action %d
   server role = standalone server
   obey pam restrictions = yes
   unix password sync = yes
   pam password change = yes
   passwd program = /usr/bin/passwd %u
   passwd chat = *Enter\snew\s*\spassword:* %n\n *Retype\snew\s*\spassword:* %n\n *password\supdated\ssuccessfully* .
"#,
            workgroup = self.settings.workgroup,
            server_string = self.settings.server_string,
        )
    }
}

fn share_section(name: &str, path: &str) -> String {
    format!(
        r#"
[{name}]
   path = {path}
   browseable = yes
   read only = no
   guest ok = no
   valid users = @sambashare
   create mask = 0664
   directory mask = 0775
   force group = sambashare
"#
    )
}

/// Extract `[name]` / `path =` pairs from share daemon configuration text
fn parse_shares(text: &str) -> Vec<ShareInfo> {
    let mut shares = Vec::new();
    let mut current: Option<ShareInfo> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.len() >= 2 && trimmed.starts_with('[') && trimmed.ends_with(']') {
            if let Some(share) = current.take() {
                shares.push(share);
            }
            let name = &trimmed[1..trimmed.len() - 1];
            if !name.eq_ignore_ascii_case("global") {
                current = Some(ShareInfo {
                    name: name.to_string(),
                    path: "N/A".to_string(),
                });
            }
        } else if let Some(share) = current.as_mut() {
            if let Some(rest) = trimmed.strip_prefix("path") {
                if let Some(value) = rest.trim_start().strip_prefix('=') {
                    share.path = value.trim().to_string();
                }
            }
        }
    }
    if let Some(share) = current.take() {
        shares.push(share);
    }

    shares
}
