//! MCP session client layered over a transport.
//!
//! Owns the initialize handshake and the capability RPCs; framing and
//! timeouts belong to the transport.
//! Reference: <https://spec.modelcontextprotocol.io/>

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use mcphub_core::{ResourceInfo, ResourceTemplateInfo, ToolInfo, Transport, TransportError};

/// Protocol revision this client speaks.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP initialize result.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
}

/// Server information from initialize.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Capabilities advertised by the server during initialize.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub resources: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ToolSchema {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    input_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSchema {
    uri: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceTemplateSchema {
    uri_template: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

/// An initialized MCP session over one transport.
pub struct McpClient {
    server_name: String,
    transport: Arc<dyn Transport>,
    capabilities: ServerCapabilities,
}

impl McpClient {
    /// Start the transport and run the initialize handshake.
    pub async fn connect(
        server_name: impl Into<String>,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let server_name = server_name.into();
        transport.start().await?;

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "mcphub",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {},
        });

        let raw = transport.request("initialize", Some(params), timeout).await?;
        let result: InitializeResult = serde_json::from_value(raw)?;

        tracing::debug!(
            server_name = %server_name,
            remote_name = %result.server_info.name,
            protocol = %result.protocol_version,
            "MCP session initialized"
        );

        transport.notify("notifications/initialized", None).await?;

        Ok(Self {
            server_name,
            transport,
            capabilities: result.capabilities,
        })
    }

    /// List available tools; empty when the server lacks the capability.
    pub async fn list_tools(&self, timeout: Duration) -> Result<Vec<ToolInfo>, TransportError> {
        if self.capabilities.tools.is_none() {
            return Ok(Vec::new());
        }

        let result = self.transport.request("tools/list", None, timeout).await?;
        let raw = result.get("tools").cloned().unwrap_or_else(|| json!([]));
        let tools: Vec<ToolSchema> = serde_json::from_value(raw)?;

        Ok(tools
            .into_iter()
            .map(|t| ToolInfo {
                name: t.name,
                description: t.description,
                input_schema: t.input_schema,
                always_allow: false,
            })
            .collect())
    }

    /// List resources; empty when the server lacks the capability.
    pub async fn list_resources(
        &self,
        timeout: Duration,
    ) -> Result<Vec<ResourceInfo>, TransportError> {
        if self.capabilities.resources.is_none() {
            return Ok(Vec::new());
        }

        let result = self
            .transport
            .request("resources/list", None, timeout)
            .await?;
        let raw = result.get("resources").cloned().unwrap_or_else(|| json!([]));
        let resources: Vec<ResourceSchema> = serde_json::from_value(raw)?;

        Ok(resources
            .into_iter()
            .map(|r| ResourceInfo {
                uri: r.uri,
                name: r.name,
                description: r.description,
                mime_type: r.mime_type,
            })
            .collect())
    }

    /// List resource templates; empty when the server lacks the capability.
    pub async fn list_resource_templates(
        &self,
        timeout: Duration,
    ) -> Result<Vec<ResourceTemplateInfo>, TransportError> {
        if self.capabilities.resources.is_none() {
            return Ok(Vec::new());
        }

        let result = self
            .transport
            .request("resources/templates/list", None, timeout)
            .await?;
        let raw = result
            .get("resourceTemplates")
            .cloned()
            .unwrap_or_else(|| json!([]));
        let templates: Vec<ResourceTemplateSchema> = serde_json::from_value(raw)?;

        Ok(templates
            .into_iter()
            .map(|t| ResourceTemplateInfo {
                uri_template: t.uri_template,
                name: t.name,
                description: t.description,
                mime_type: t.mime_type,
            })
            .collect())
    }

    /// Call a tool and return the raw result payload.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let params = json!({
            "name": tool_name,
            "arguments": arguments.unwrap_or_else(|| json!({})),
        });
        self.transport.request("tools/call", Some(params), timeout).await
    }

    /// Read a resource by URI and return the raw result payload.
    pub async fn read_resource(
        &self,
        uri: &str,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let params = json!({ "uri": uri });
        self.transport
            .request("resources/read", Some(params), timeout)
            .await
    }

    /// Name of the server entry this session belongs to.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Close the underlying transport.
    pub async fn close(&self) {
        self.transport.close().await;
    }
}
