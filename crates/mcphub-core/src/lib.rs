//! Core domain types and port definitions for mcphub.
//!
//! This crate carries no runtime machinery: domain types, the settings
//! document model, the event union, and the traits the runtime crate
//! implements. Adapter-specific dependencies stay out of here.

pub mod domain;
pub mod events;
pub mod ports;
pub mod settings;

pub use domain::{
    ResourceInfo, ResourceTemplateInfo, ServerConfig, ServerSnapshot, ServerStatus, ToolInfo,
    DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS,
};
pub use events::HubEvent;
pub use ports::{
    HubConsumer, HubError, HubEventEmitter, NoopEmitter, Transport, TransportError, TransportEvent,
    TransportFactory,
};
pub use settings::{McpSettings, SettingsError};
