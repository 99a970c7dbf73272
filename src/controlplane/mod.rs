//! Control plane
//!
//! The provisioning orchestrator, the integrity scan supervisor, the
//! shared status records they own, and the REST API on top.

pub mod api;
pub mod orchestrator;
pub mod scan;
pub mod state;

pub use api::*;
pub use orchestrator::*;
pub use scan::*;
pub use state::*;
