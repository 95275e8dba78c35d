//! Error types for tunnel lifecycle operations.
//!
//! This module defines all error types that can occur while managing
//! WAN tunnels, including validation failures, external command
//! failures, and persistence errors.

use thiserror::Error;

/// Result type alias for tunnel operations.
pub type Result<T> = std::result::Result<T, TunnelError>;

/// wg-quick's complaint when asked to tear down an interface that is
/// already gone. Treated as success by best-effort stop paths.
const NOT_A_TUNNEL_MARKER: &str = "is not a WireGuard interface";

/// Errors that can occur during tunnel operations.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// A required field is missing or has an invalid value.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// The offending field, in the request's naming.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The requested protocol is not one of the supported dialects.
    #[error("invalid protocol: {0}. Must be 'wireguard-1.0' or 'amneziawg-2.0'")]
    UnsupportedProtocol(String),

    /// No tunnel is registered under the given interface name.
    #[error("WAN tunnel not found: {0}")]
    NotFound(String),

    /// Key generation or public-key derivation failed.
    #[error("key generation failed: {message}")]
    KeyGeneration {
        /// What the key tool reported. Never contains key material.
        message: String,
    },

    /// An external command exited unsuccessfully.
    #[error("command failed: {command} exited with {exit_code}: {stderr}")]
    Command {
        /// The command that was executed.
        command: String,
        /// Exit code of the command (-1 if terminated by signal).
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// Bringing a tunnel interface up failed.
    #[error("failed to start tunnel {interface}: {source}")]
    StartFailed {
        /// The interface that could not be started.
        interface: String,
        /// The underlying command failure.
        #[source]
        source: Box<TunnelError>,
    },

    /// An external command did not complete in time.
    #[error("timeout: {operation} did not complete within {timeout_secs} seconds")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// Timeout duration in seconds.
        timeout_secs: u64,
    },

    /// IO error (record/manifest/config file operations, process I/O).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest or record (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TunnelError {
    /// Creates a `Validation` error naming the offending field.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Validation` error for a missing required field.
    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: "is required".to_string(),
        }
    }

    /// Creates a `KeyGeneration` error with a message.
    #[must_use]
    pub fn key_generation(message: impl Into<String>) -> Self {
        Self::KeyGeneration {
            message: message.into(),
        }
    }

    /// Creates a `Command` error.
    #[must_use]
    pub fn command_failed(
        command: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        Self::Command {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Creates a `Timeout` error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, timeout_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_secs,
        }
    }

    /// Returns `true` if this error reports invalid caller input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::UnsupportedProtocol(_)
        )
    }

    /// Returns `true` if this error is an unknown-interface lookup.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if this is a tunnel-down failure that means the
    /// interface was already gone.
    ///
    /// wg-quick has no structured exit code for this case, so the check
    /// falls back to its stderr text contract.
    #[must_use]
    pub fn is_benign_down(&self) -> bool {
        match self {
            Self::Command { stderr, .. } => stderr.contains(NOT_A_TUNNEL_MARKER),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_field() {
        let err = TunnelError::missing_field("remoteEndpoint");
        assert_eq!(err.to_string(), "invalid remoteEndpoint: is required");
        assert!(err.is_validation());
    }

    #[test]
    fn unsupported_protocol_display() {
        let err = TunnelError::UnsupportedProtocol("bogus".to_string());
        assert!(err.to_string().contains("bogus"));
        assert!(err.to_string().contains("wireguard-1.0"));
        assert!(err.is_validation());
    }

    #[test]
    fn not_found_display() {
        let err = TunnelError::NotFound("wg13".to_string());
        assert_eq!(err.to_string(), "WAN tunnel not found: wg13");
        assert!(err.is_not_found());
    }

    #[test]
    fn command_failed_display() {
        let err = TunnelError::command_failed("wg-quick up wg10", 1, "resolv failure");
        assert_eq!(
            err.to_string(),
            "command failed: wg-quick up wg10 exited with 1: resolv failure"
        );
    }

    #[test]
    fn start_failed_wraps_interface_name() {
        let cause = TunnelError::command_failed("wg-quick up wg10", 1, "boom");
        let err = TunnelError::StartFailed {
            interface: "wg10".to_string(),
            source: Box::new(cause),
        };
        assert!(err.to_string().starts_with("failed to start tunnel wg10"));
    }

    #[test]
    fn benign_down_classification() {
        let benign =
            TunnelError::command_failed("wg-quick down wg11", 1, "`wg11' is not a WireGuard interface");
        assert!(benign.is_benign_down());

        let real = TunnelError::command_failed("wg-quick down wg11", 1, "permission denied");
        assert!(!real.is_benign_down());

        let unrelated = TunnelError::NotFound("wg11".to_string());
        assert!(!unrelated.is_benign_down());
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no manifest");
        let err: TunnelError = io_err.into();
        assert!(matches!(err, TunnelError::Io(_)));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TunnelError>();
    }
}
