//! Core domain types and ports
//!
//! Data model shared across readers, orchestrator, and API, plus the
//! trait seams adapters implement.

pub mod model;
pub mod ports;

pub use model::*;
pub use ports::*;
