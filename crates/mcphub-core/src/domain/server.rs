//! MCP server domain types.
//!
//! These types mirror the persisted settings document and the snapshot
//! views presented to consumers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Smallest accepted per-server request timeout, in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 1;

/// Largest accepted per-server request timeout, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Timeout applied when an entry does not declare one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Runtime status of a server connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Connection attempt in progress
    Connecting,
    /// Session established and capabilities fetched
    Connected,
    /// Not connected (never connected, failed, or closed)
    #[default]
    Disconnected,
}

/// One entry of the `mcpServers` settings document.
///
/// Unknown sibling fields are captured in `extra` so a round-trip
/// through the store rewrites them verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Command to execute (e.g., "node" or "/usr/local/bin/npx").
    pub command: String,

    /// Arguments to pass to the executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Environment variables for the server process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,

    /// Tool names exempt from interactive approval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always_allow: Option<Vec<String>>,

    /// Visibility/usability gate; never tears down a live connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    /// Per-server request timeout in seconds (1..=3600).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Unknown sibling fields, preserved verbatim on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ServerConfig {
    /// Create a minimal config for a command with arguments.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args: Some(args),
            ..Self::default()
        }
    }

    /// Launch arguments, empty when unset.
    #[must_use]
    pub fn args(&self) -> &[String] {
        self.args.as_deref().unwrap_or(&[])
    }

    /// The alwaysAllow list, empty when unset.
    #[must_use]
    pub fn always_allow(&self) -> &[String] {
        self.always_allow.as_deref().unwrap_or(&[])
    }

    /// Whether the entry is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }

    /// Effective request timeout in seconds.
    #[must_use]
    pub fn timeout_secs(&self) -> u64 {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Validate the entry against the document schema.
    ///
    /// Field types are enforced by deserialization; this checks the
    /// constraints serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.command.trim().is_empty() {
            return Err("server command cannot be empty".to_string());
        }

        if let Some(timeout) = self.timeout {
            if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout) {
                return Err(format!(
                    "timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds, got {timeout}"
                ));
            }
        }

        Ok(())
    }
}

/// Tool definition cached from a server, tagged with the derived
/// alwaysAllow flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    /// Tool name (function name).
    pub name: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for input parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,

    /// Whether this tool is on the server's alwaysAllow list.
    #[serde(default)]
    pub always_allow: bool,
}

impl ToolInfo {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
            always_allow: false,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Resource cached from a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// Resource URI.
    pub uri: String,

    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MIME type, when the server declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Resource template cached from a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateInfo {
    /// URI template (RFC 6570).
    pub uri_template: String,

    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MIME type, when the server declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Consumer-facing view of one connection.
///
/// Snapshots are always presented in the declaration order of the
/// settings document, not creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSnapshot {
    /// Server name (unique key in the settings document).
    pub name: String,

    /// Serialized `ServerConfig` as persisted.
    pub config: String,

    /// Current connection status.
    pub status: ServerStatus,

    /// Accumulated error text; cleared only on successful reconnect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the entry is disabled in settings.
    pub disabled: bool,

    /// Cached tool list.
    #[serde(default)]
    pub tools: Vec<ToolInfo>,

    /// Cached resource list.
    #[serde(default)]
    pub resources: Vec<ResourceInfo>,

    /// Cached resource-template list.
    #[serde(default)]
    pub resource_templates: Vec<ResourceTemplateInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::new("node", vec!["server.js".to_string()]);
        assert_eq!(config.command, "node");
        assert_eq!(config.args(), &["server.js".to_string()]);
        assert!(config.always_allow().is_empty());
        assert!(!config.is_disabled());
        assert_eq!(config.timeout_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_validate_empty_command() {
        let config = ServerConfig {
            command: "  ".to_string(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let mut config = ServerConfig::new("node", vec![]);

        config.timeout = Some(MIN_TIMEOUT_SECS);
        assert!(config.validate().is_ok());

        config.timeout = Some(MAX_TIMEOUT_SECS);
        assert!(config.validate().is_ok());

        config.timeout = Some(0);
        assert!(config.validate().is_err());

        config.timeout = Some(MAX_TIMEOUT_SECS + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let raw = r#"{"command":"node","args":["a.js"],"vendorHint":{"nested":true}}"#;
        let config: ServerConfig = serde_json::from_str(raw).unwrap();
        assert!(config.extra.contains_key("vendorHint"));

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["vendorHint"]["nested"], serde_json::json!(true));
    }

    #[test]
    fn test_always_allow_serializes_camel_case() {
        let config = ServerConfig {
            command: "node".to_string(),
            always_allow: Some(vec!["lint".to_string()]),
            ..ServerConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"alwaysAllow\":[\"lint\"]"));
    }

    #[test]
    fn test_negative_timeout_fails_parse() {
        let raw = r#"{"command":"node","timeout":-1}"#;
        assert!(serde_json::from_str::<ServerConfig>(raw).is_err());
    }
}
