//! API Module
//!
//! REST surface for the dashboard: request/response operations plus the
//! progress-polling endpoints.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
