//! NAS Array Operator
//!
//! Provisions and supervises a parity-protected storage array on a single
//! host and exposes its state to the dashboard over REST.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        REST API (axum)                          │
//! │   disks · array status · configure · check · add/replace ·     │
//! │   shares · progress polling                                     │
//! ├──────────────────────────────┬──────────────────────────────────┤
//! │    Provisioning              │       Integrity Scan             │
//! │    Orchestrator              │       Supervisor                 │
//! │  partition → array → start   │   nmdctl check, streamed         │
//! │  → filesystem → mount →      │   percent markers                │
//! │  samba → check               │                                  │
//! ├──────────────────────────────┴──────────────────────────────────┤
//! │                      Status Board                               │
//! │      provisioning record · scan record (guarded singletons)     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   Disk Inventory    │   Array Status     │  Share Config        │
//! │   (lsblk)           │   (nmdctl, df)     │  Writer (smb.conf,   │
//! │                     │                    │  mergerfs, testparm) │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                  Command Runner (tokio::process)                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: orchestrator, scan supervisor, status board, REST API
//! - [`hardware`]: disk inventory and array status readers
//! - [`shares`]: share daemon configuration writer
//! - [`exec`]: external command execution
//! - [`domain`]: core data model and ports
//! - [`error`]: error types and handling

pub mod controlplane;
pub mod domain;
pub mod error;
pub mod exec;
pub mod hardware;
pub mod shares;

// Re-export commonly used types
pub use controlplane::{
    ApiContext, ApiServer, ApiServerConfig, ArrayOrchestrator, OrchestratorConfig, RestRouter,
    ScanSupervisor, StatusBoard,
};

pub use domain::model::{
    ArraySnapshot, ArrayState, DiskDescriptor, PartitionDescriptor, ProvisioningState,
    ProvisioningStep, ScanKind, ScanState, ShareInfo, ShareMode, SlotUsage,
};

pub use domain::ports::{CommandOutput, CommandRunner, CommandRunnerRef, SupervisedChild};

pub use error::{Error, Result};

pub use exec::{RunnerConfig, SystemRunner};

pub use hardware::{
    ArrayConfig, ArrayStatusReader, ArrayToolStatus, DiskInventory, InventoryConfig,
};

pub use shares::{SambaSettings, ShareConfigWriter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
