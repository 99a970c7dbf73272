//! Hardware readers
//!
//! Read-only views of the host: the physical disk inventory and the
//! parity array status.

pub mod array;
pub mod inventory;

pub use array::*;
pub use inventory::*;
