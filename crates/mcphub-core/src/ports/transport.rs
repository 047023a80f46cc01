//! Transport contract for server processes.
//!
//! The wire-level framing is the implementation's business; the hub
//! only relies on `start`/`request`/`close` plus an event stream that
//! reports diagnostics, transport errors, and closure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::ServerConfig;

/// Errors that can occur at the transport level.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to spawn server process: {0}")]
    SpawnFailed(String),

    #[error("Failed to communicate with server: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout waiting for server response")]
    Timeout,

    #[error("Server returned error: code={code}, message={message}")]
    ServerError { code: i64, message: String },

    #[error("Transport not started")]
    NotStarted,
}

/// Out-of-band notifications from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Diagnostic output (stderr-style). Appended to the connection's
    /// error text without changing its status.
    Stderr(String),
    /// The transport failed; the connection is no longer usable.
    Error(String),
    /// The channel closed (process exit or EOF).
    Closed,
}

/// The process+RPC channel for one configured server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Launch the underlying process/channel.
    async fn start(&self) -> Result<(), TransportError>;

    /// Send a request and await its response, bounded by `timeout`.
    ///
    /// Request multiplexing and timeout enforcement live here, not in
    /// the supervisor.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, TransportError>;

    /// Send a one-way notification.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError>;

    /// Take the out-of-band event stream.
    ///
    /// Returns `None` after the first call; there is exactly one
    /// consumer (the supervisor's monitor task).
    fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>>;

    /// Close the channel and reap the process. Idempotent; failures
    /// are the implementation's to swallow and log.
    async fn close(&self);
}

/// Factory for transports, injected into the hub so tests can swap in
/// scripted fakes.
pub trait TransportFactory: Send + Sync {
    /// Build an unstarted transport for one server entry.
    fn create(&self, name: &str, config: &ServerConfig) -> Arc<dyn Transport>;
}
