//! MCP hub runtime: stdio transports, session clients, the connection
//! supervisor, and the process-wide registry.
//!
//! The typical entry point is [`HubRegistry`]: register a consumer,
//! receive the shared [`McpHub`], and drive servers through it.

#![deny(unsafe_code)]

pub mod client;
pub mod connection;
pub mod hub;
pub mod registry;
pub mod settings;
pub mod transport;
pub mod watcher;

// Re-export domain types from core for convenience
pub use mcphub_core::{
    HubConsumer, HubError, HubEvent, HubEventEmitter, NoopEmitter, ResourceInfo,
    ResourceTemplateInfo, ServerConfig, ServerSnapshot, ServerStatus, ToolInfo,
};

// Re-export this crate's public types
pub use client::McpClient;
pub use connection::McpConnection;
pub use hub::McpHub;
pub use registry::{BroadcastEmitter, HubRegistry};
pub use settings::{McpSettingsStore, SETTINGS_FILE_NAME};
pub use transport::{StdioTransport, StdioTransportFactory};
pub use watcher::{find_build_artifact, ArtifactWatcher};
