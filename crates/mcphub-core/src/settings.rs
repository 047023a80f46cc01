//! Settings document model and validation.
//!
//! The persisted document is a single JSON object keyed by server name:
//!
//! ```json
//! { "mcpServers": { "<name>": { "command": "...", ... } } }
//! ```
//!
//! Declaration order of the `mcpServers` keys is significant: it is the
//! order in which connections are presented to consumers. `serde_json`
//! is built with `preserve_order` so the map keeps it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ServerConfig;

/// Parsed settings document.
///
/// Unknown top-level siblings of `mcpServers` are preserved verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpSettings {
    /// Server entries, keyed by unique name, in declaration order.
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: serde_json::Map<String, Value>,

    /// Unknown top-level fields, preserved verbatim on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl McpSettings {
    /// The empty document written when no settings file exists yet.
    #[must_use]
    pub fn empty_document() -> String {
        "{\n  \"mcpServers\": {}\n}\n".to_string()
    }

    /// Parse and validate every entry, in declaration order.
    ///
    /// Fails as a whole if any entry is malformed; a partial document
    /// is never produced.
    pub fn validated_entries(&self) -> Result<Vec<(String, ServerConfig)>, SettingsError> {
        let mut entries = Vec::with_capacity(self.mcp_servers.len());

        for (name, raw) in &self.mcp_servers {
            let config: ServerConfig = serde_json::from_value(raw.clone()).map_err(|e| {
                SettingsError::InvalidServer {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;

            config
                .validate()
                .map_err(|reason| SettingsError::InvalidServer {
                    name: name.clone(),
                    reason,
                })?;

            entries.push((name.clone(), config));
        }

        Ok(entries)
    }
}

/// Errors from reading, validating, or rewriting the settings document.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to access settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings JSON in {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Invalid MCP server \"{name}\": {reason}")]
    InvalidServer { name: String, reason: String },

    #[error("No MCP server named \"{0}\" in settings")]
    ServerNotFound(String),
}
