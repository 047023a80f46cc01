//! Domain types shared across the workspace.

mod server;

pub use server::{
    ResourceInfo, ResourceTemplateInfo, ServerConfig, ServerSnapshot, ServerStatus, ToolInfo,
    DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS,
};
