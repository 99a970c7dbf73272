//! Error types for the NAS array operator
//!
//! Provides structured error types for all operator components including
//! command execution, inventory and array status reads, the provisioning
//! pipeline, and the share configuration writer.

use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Command Execution Errors
    // =========================================================================
    #[error("Required tool not available: {tool}")]
    ToolUnavailable { tool: String },

    #[error("Command failed: {command} (exit code {code}): {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    // =========================================================================
    // Status Query Errors
    // =========================================================================
    #[error("Array status query failed: {0}")]
    StatusQuery(String),

    #[error("Unexpected tool output: {0}")]
    Parse(String),

    // =========================================================================
    // Provisioning Errors
    // =========================================================================
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("A provisioning run is already active")]
    ProvisioningActive,

    #[error("Provisioning cancelled at step '{step}'")]
    Cancelled { step: String },

    // =========================================================================
    // Scan Errors
    // =========================================================================
    #[error("A parity check is already in progress")]
    ScanAlreadyRunning,

    // =========================================================================
    // Share Configuration Errors
    // =========================================================================
    #[error("Share configuration install failed: {0}")]
    ShareInstall(String),

    // =========================================================================
    // Parse/IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status code used when this error surfaces at the request boundary
    pub fn http_status(&self) -> u16 {
        match self {
            // Bad request shape or rejected preconditions
            Error::Validation(_)
            | Error::ProvisioningActive
            | Error::ScanAlreadyRunning => 400,

            // Everything else is a server-side failure
            _ => 500,
        }
    }

    /// Check whether this error is a rejection rather than a failure
    pub fn is_rejection(&self) -> bool {
        self.http_status() == 400
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Error::Validation("bad".into()).http_status(), 400);
        assert_eq!(Error::ProvisioningActive.http_status(), 400);
        assert_eq!(Error::ScanAlreadyRunning.http_status(), 400);

        let failed = Error::CommandFailed {
            command: "nmdctl start".into(),
            code: 1,
            stderr: "array not found".into(),
        };
        assert_eq!(failed.http_status(), 500);
        assert!(!failed.is_rejection());

        assert_eq!(
            Error::ToolUnavailable { tool: "nmdctl".into() }.http_status(),
            500
        );
    }

    #[test]
    fn test_rejections() {
        assert!(Error::ScanAlreadyRunning.is_rejection());
        assert!(Error::Validation("missing disk".into()).is_rejection());
        assert!(!Error::StatusQuery("bad json".into()).is_rejection());
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::CommandFailed {
            command: "sgdisk -o /dev/sdb".into(),
            code: 2,
            stderr: "device busy".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sgdisk -o /dev/sdb"));
        assert!(msg.contains("exit code 2"));
        assert!(msg.contains("device busy"));
    }
}
