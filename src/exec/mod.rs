//! Command execution
//!
//! The system-backed [`CommandRunner`](crate::domain::ports::CommandRunner)
//! implementation, plus a scripted double for tests.

pub mod system;

#[cfg(test)]
pub mod script;

pub use system::*;
