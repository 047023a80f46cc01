//! One process+session pair per configured server.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use mcphub_core::{
    ResourceInfo, ResourceTemplateInfo, ServerConfig, ServerSnapshot, ServerStatus, ToolInfo,
    DEFAULT_TIMEOUT_SECS,
};

use crate::client::McpClient;

/// Live record for one configured server.
///
/// Created during reconciliation when a name first appears or its
/// config changes; destroyed on removal, replacement, or disposal.
/// A failed connect still leaves a disconnected record carrying the
/// error, so the server is never silently discarded.
pub struct McpConnection {
    /// Server name (unique key in the settings document).
    pub name: String,

    /// Parsed config as of the last reconciliation.
    pub config: ServerConfig,

    /// Serialized config snapshot; the deep-compare key for
    /// reconciliation and the source for call-time timeout reads.
    pub config_json: String,

    /// Current status.
    pub status: ServerStatus,

    /// Accumulated error text; cleared only on successful reconnect.
    pub error: String,

    /// Cached tool list, each tagged with the derived alwaysAllow flag.
    pub tools: Vec<ToolInfo>,

    /// Cached resource list.
    pub resources: Vec<ResourceInfo>,

    /// Cached resource-template list.
    pub resource_templates: Vec<ResourceTemplateInfo>,

    /// Session handle; absent while disconnected.
    pub(crate) client: Option<Arc<McpClient>>,

    /// Task draining the transport's event stream.
    pub(crate) monitor: Option<JoinHandle<()>>,
}

impl McpConnection {
    /// Create a record in the connecting state, before any I/O.
    #[must_use]
    pub fn new(name: impl Into<String>, config: ServerConfig) -> Self {
        let config_json = serde_json::to_string(&config).unwrap_or_default();
        Self {
            name: name.into(),
            config,
            config_json,
            status: ServerStatus::Connecting,
            error: String::new(),
            tools: Vec::new(),
            resources: Vec::new(),
            resource_templates: Vec::new(),
            client: None,
            monitor: None,
        }
    }

    /// Append to the accumulated error text.
    pub fn append_error(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.error.is_empty() {
            self.error.push('\n');
        }
        self.error.push_str(text);
    }

    /// Request timeout derived from the serialized config at call time,
    /// defaulting to 60s when the snapshot does not parse.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        let secs = serde_json::from_str::<ServerConfig>(&self.config_json)
            .map_or(DEFAULT_TIMEOUT_SECS, |config| config.timeout_secs());
        Duration::from_secs(secs)
    }

    /// Re-derive each cached tool's alwaysAllow flag from the config.
    pub fn refresh_tool_flags(&mut self) {
        let allow = self.config.always_allow();
        for tool in &mut self.tools {
            tool.always_allow = allow.contains(&tool.name);
        }
    }

    /// Replace the config and its serialized snapshot.
    pub fn set_config(&mut self, config: ServerConfig) {
        self.config_json = serde_json::to_string(&config).unwrap_or_default();
        self.config = config;
    }

    /// Consumer-facing view of this connection.
    #[must_use]
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            name: self.name.clone(),
            config: self.config_json.clone(),
            status: self.status,
            error: if self.error.is_empty() {
                None
            } else {
                Some(self.error.clone())
            },
            disabled: self.config.is_disabled(),
            tools: self.tools.clone(),
            resources: self.resources.clone(),
            resource_templates: self.resource_templates.clone(),
        }
    }

    /// Best-effort teardown: stop the monitor and close the session.
    pub async fn close(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
        if let Some(client) = self.client.take() {
            client.close().await;
        }
        self.status = ServerStatus::Disconnected;
    }
}
