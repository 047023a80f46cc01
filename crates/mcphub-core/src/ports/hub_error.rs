//! Hub service error types.

use thiserror::Error;

use crate::settings::SettingsError;

/// Domain-specific errors for hub operations.
///
/// Four families, with distinct handling:
/// - settings/document errors abort the operation and retain prior state
/// - connection failures are recorded on the connection, never aborting
///   reconciliation of sibling servers
/// - request failures propagate to the caller of that one call
/// - usage errors are rejected before any I/O is attempted
#[derive(Debug, Error)]
pub enum HubError {
    /// The settings document is malformed or could not be rewritten.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// A server process or its transport failed.
    #[error("Failed to connect to MCP server \"{name}\": {reason}")]
    ConnectionFailed { name: String, reason: String },

    /// A tool/resource call failed on an otherwise healthy connection.
    #[error("Request to MCP server \"{name}\" failed: {reason}")]
    RequestFailed { name: String, reason: String },

    /// A tool/resource call exceeded the per-server timeout.
    #[error("Request to MCP server \"{name}\" timed out after {secs}s")]
    RequestTimeout { name: String, secs: u64 },

    /// No connection exists for the named server.
    #[error("No connection found for MCP server: {0}")]
    NoConnection(String),

    /// The named server is disabled in settings.
    #[error("MCP server \"{0}\" is disabled")]
    ServerDisabled(String),

    /// Timeout value outside the accepted range.
    #[error("Invalid timeout: must be between 1 and 3600 seconds, got {0}")]
    InvalidTimeout(u64),
}
