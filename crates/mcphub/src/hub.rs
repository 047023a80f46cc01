//! Connection supervisor.
//!
//! Owns the set of live connections, converges them onto the settings
//! document through reconciliation, and fronts tool/resource RPC with
//! per-server timeouts. One hub exists per host process, shared via
//! the registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;

use mcphub_core::{
    HubError, HubEvent, HubEventEmitter, ServerConfig, ServerSnapshot, ServerStatus,
    TransportError, TransportEvent, TransportFactory, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS,
};

use crate::client::McpClient;
use crate::connection::McpConnection;
use crate::settings::McpSettingsStore;
use crate::watcher::{find_build_artifact, ArtifactWatcher, POLL_INTERVAL};

/// Fixed delay between flipping a restarting server to `connecting`
/// and tearing it down, so the transition is visible to consumers.
const RESTART_DELAY: Duration = Duration::from_millis(500);

struct HubState {
    /// Live connections, kept in settings declaration order.
    connections: Vec<McpConnection>,
    /// Build-artifact watchers, keyed by server name. Torn down and
    /// rebuilt on every reconciliation pass.
    watchers: HashMap<String, ArtifactWatcher>,
}

/// Supervisor for the configured set of MCP servers.
pub struct McpHub {
    store: McpSettingsStore,
    transports: Arc<dyn TransportFactory>,
    emitter: Arc<dyn HubEventEmitter>,
    state: Arc<RwLock<HubState>>,
    /// Advisory flag: a reconciliation pass is active. Not a lock.
    is_connecting: AtomicBool,
    settings_watcher: std::sync::Mutex<Option<ArtifactWatcher>>,
    poll_interval: Duration,
}

impl McpHub {
    /// Create an idle hub; call [`Self::initialize`] to load settings
    /// and bring connections up.
    pub fn new(
        store: McpSettingsStore,
        transports: Arc<dyn TransportFactory>,
        emitter: Arc<dyn HubEventEmitter>,
    ) -> Self {
        Self {
            store,
            transports,
            emitter,
            state: Arc::new(RwLock::new(HubState {
                connections: Vec::new(),
                watchers: HashMap::new(),
            })),
            is_connecting: AtomicBool::new(false),
            settings_watcher: std::sync::Mutex::new(None),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the watcher polling interval (tests).
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Load settings, reconcile from empty, and watch the settings
    /// file for external edits.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), HubError> {
        let path = self.store.path().await?;
        let desired = self.store.read().await?;
        self.reconcile(desired).await;

        let weak = Arc::downgrade(self);
        let watcher = ArtifactWatcher::spawn(path, self.poll_interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(hub) = weak.upgrade() {
                    hub.reload_from_settings().await;
                }
            }
        });

        if let Ok(mut slot) = self.settings_watcher.lock() {
            *slot = Some(watcher);
        }

        Ok(())
    }

    /// Re-read the settings file and reconcile; an invalid document is
    /// reported and the current server set retained.
    async fn reload_from_settings(self: &Arc<Self>) {
        match self.store.read().await {
            Ok(desired) => self.reconcile(desired).await,
            Err(e) => {
                tracing::error!(error = %e, "Invalid MCP settings; keeping current servers");
            }
        }
    }

    /// Converge live connections onto `desired`.
    ///
    /// Removed or changed names are closed, new names connected (a
    /// failed connect keeps a disconnected record carrying the error),
    /// unchanged names untouched. Always ends with a full ordered
    /// broadcast.
    pub async fn reconcile(self: &Arc<Self>, desired: Vec<(String, ServerConfig)>) {
        self.is_connecting.store(true, Ordering::SeqCst);

        let desired_json: Vec<(String, String)> = desired
            .iter()
            .map(|(name, config)| {
                (
                    name.clone(),
                    serde_json::to_string(config).unwrap_or_default(),
                )
            })
            .collect();

        // Phase 1: close connections with no (identical) counterpart.
        let stale: Vec<String> = {
            let state = self.state.read().await;
            state
                .connections
                .iter()
                .filter(|conn| {
                    !desired_json
                        .iter()
                        .any(|(name, json)| *name == conn.name && *json == conn.config_json)
                })
                .map(|conn| conn.name.clone())
                .collect()
        };

        for name in &stale {
            self.remove_connection(name).await;
            tracing::info!(server_name = %name, "Closed MCP connection during reconcile");
        }

        // Phase 2: rebuild every artifact watcher from the new configs.
        {
            let mut state = self.state.write().await;
            state.watchers.clear();
            for (name, config) in &desired {
                if let Some(artifact) = find_build_artifact(config) {
                    let watcher = self.spawn_artifact_watcher(name.clone(), artifact);
                    state.watchers.insert(name.clone(), watcher);
                }
            }
        }

        // Phase 3: connect names without a live record. The state lock
        // is not held across connects, so in-flight calls to other
        // servers proceed.
        for (name, config) in desired {
            let already_present = {
                let state = self.state.read().await;
                state.connections.iter().any(|conn| conn.name == name)
            };
            if already_present {
                continue;
            }

            let conn = self.connect_server(&name, config).await;
            self.insert_connection(conn, None).await;
        }

        // Phase 4: present connections in settings declaration order.
        {
            let mut state = self.state.write().await;
            state.connections.sort_by_key(|conn| {
                desired_json
                    .iter()
                    .position(|(name, _)| *name == conn.name)
                    .unwrap_or(usize::MAX)
            });
        }

        self.is_connecting.store(false, Ordering::SeqCst);
        self.notify_consumers().await;
    }

    /// Attempt one connection; never fails. A connect failure yields a
    /// disconnected record with the error appended.
    async fn connect_server(self: &Arc<Self>, name: &str, config: ServerConfig) -> McpConnection {
        let mut conn = McpConnection::new(name, config);
        let timeout = conn.request_timeout();

        let transport = self.transports.create(name, &conn.config);
        let events = transport.take_events();

        match McpClient::connect(name, transport, timeout).await {
            Ok(client) => {
                let client = Arc::new(client);

                // Capability fetches degrade to empty lists.
                conn.tools = client.list_tools(timeout).await.unwrap_or_else(|e| {
                    tracing::warn!(server_name = %name, error = %e, "Failed to fetch tool list");
                    Vec::new()
                });
                conn.resources = client.list_resources(timeout).await.unwrap_or_else(|e| {
                    tracing::warn!(server_name = %name, error = %e, "Failed to fetch resource list");
                    Vec::new()
                });
                conn.resource_templates = client
                    .list_resource_templates(timeout)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(server_name = %name, error = %e, "Failed to fetch resource templates");
                        Vec::new()
                    });
                conn.refresh_tool_flags();

                conn.status = ServerStatus::Connected;
                conn.error.clear();
                conn.client = Some(client);
                if let Some(events) = events {
                    conn.monitor = Some(self.spawn_monitor(name.to_string(), events));
                }

                tracing::info!(
                    server_name = %name,
                    tool_count = conn.tools.len(),
                    "MCP server connected"
                );
            }
            Err(e) => {
                conn.status = ServerStatus::Disconnected;
                conn.append_error(&e.to_string());
                tracing::error!(server_name = %name, error = %e, "Failed to connect MCP server");
            }
        }

        conn
    }

    fn spawn_artifact_watcher(self: &Arc<Self>, name: String, artifact: PathBuf) -> ArtifactWatcher {
        let weak = Arc::downgrade(self);
        ArtifactWatcher::spawn(artifact, self.poll_interval, move || {
            let weak = weak.clone();
            let name = name.clone();
            async move {
                if let Some(hub) = weak.upgrade() {
                    tracing::info!(server_name = %name, "Build artifact changed; restarting server");
                    if let Err(e) = hub.restart_connection(&name).await {
                        tracing::warn!(server_name = %name, error = %e, "Artifact-triggered restart failed");
                    }
                }
            }
        })
    }

    /// Drain a transport's out-of-band events into connection state.
    fn spawn_monitor(
        self: &Arc<Self>,
        name: String,
        mut events: tokio::sync::mpsc::Receiver<TransportEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(hub) = weak.upgrade() else { return };
                match event {
                    TransportEvent::Stderr(line) => hub.record_diagnostic(&name, &line).await,
                    TransportEvent::Error(message) => hub.record_failure(&name, &message).await,
                    TransportEvent::Closed => hub.record_closed(&name).await,
                }
            }
        })
    }

    /// Diagnostic output appends to the error text without forcing a
    /// status change; an already-disconnected server still gets a
    /// refreshed broadcast.
    async fn record_diagnostic(&self, name: &str, line: &str) {
        let already_down = {
            let mut state = self.state.write().await;
            let Some(conn) = state.connections.iter_mut().find(|c| c.name == name) else {
                return;
            };
            conn.append_error(line);
            conn.status == ServerStatus::Disconnected
        };

        if already_down {
            self.notify_consumers().await;
        }
    }

    async fn record_failure(&self, name: &str, message: &str) {
        {
            let mut state = self.state.write().await;
            let Some(conn) = state.connections.iter_mut().find(|c| c.name == name) else {
                return;
            };
            conn.append_error(message);
            conn.status = ServerStatus::Disconnected;
        }
        tracing::warn!(server_name = %name, error = %message, "MCP transport error");
        self.notify_consumers().await;
    }

    async fn record_closed(&self, name: &str) {
        {
            let mut state = self.state.write().await;
            let Some(conn) = state.connections.iter_mut().find(|c| c.name == name) else {
                return;
            };
            conn.status = ServerStatus::Disconnected;
        }
        tracing::info!(server_name = %name, "MCP transport closed");
        self.notify_consumers().await;
    }

    /// Take the named connection out of the set and close it;
    /// idempotent, a missing name is a no-op.
    async fn remove_connection(&self, name: &str) {
        let removed = {
            let mut state = self.state.write().await;
            state
                .connections
                .iter()
                .position(|conn| conn.name == name)
                .map(|index| state.connections.remove(index))
        };

        if let Some(mut conn) = removed {
            conn.close().await;
        }
    }

    /// Insert a connection, replacing any record with the same name.
    ///
    /// A replaced record's slot is reused, and `at` pins the position
    /// otherwise; snapshots track settings declaration order, not
    /// creation order.
    async fn insert_connection(&self, conn: McpConnection, at: Option<usize>) {
        let replaced = {
            let mut state = self.state.write().await;
            let replaced = state
                .connections
                .iter()
                .position(|c| c.name == conn.name)
                .map(|index| (index, state.connections.remove(index)));

            let index = replaced
                .as_ref()
                .map(|(index, _)| *index)
                .or(at)
                .unwrap_or(state.connections.len())
                .min(state.connections.len());
            state.connections.insert(index, conn);
            replaced
        };

        if let Some((_, mut old)) = replaced {
            old.close().await;
        }
    }

    /// Whether a reconciliation pass is active (advisory).
    pub fn is_connecting(&self) -> bool {
        self.is_connecting.load(Ordering::SeqCst)
    }

    /// Path of the settings file, seeding it when absent.
    pub async fn settings_file_path(&self) -> Result<PathBuf, HubError> {
        Ok(self.store.path().await?)
    }

    /// Snapshot of enabled servers, in settings declaration order.
    pub async fn get_servers(&self) -> Vec<ServerSnapshot> {
        let state = self.state.read().await;
        state
            .connections
            .iter()
            .filter(|conn| !conn.config.is_disabled())
            .map(McpConnection::snapshot)
            .collect()
    }

    /// Snapshot of all servers (disabled included), in settings
    /// declaration order.
    pub async fn get_all_servers(&self) -> Vec<ServerSnapshot> {
        let state = self.state.read().await;
        state.connections.iter().map(McpConnection::snapshot).collect()
    }

    /// Restart the named server: flip to connecting, pause briefly,
    /// then reconnect from the stored serialized config.
    pub async fn restart_connection(self: &Arc<Self>, name: &str) -> Result<(), HubError> {
        let (index, config_json) = {
            let mut state = self.state.write().await;
            let index = state
                .connections
                .iter()
                .position(|c| c.name == name)
                .ok_or_else(|| HubError::NoConnection(name.to_string()))?;
            let conn = &mut state.connections[index];
            conn.status = ServerStatus::Connecting;
            (index, conn.config_json.clone())
        };

        let config: ServerConfig =
            serde_json::from_str(&config_json).map_err(|e| HubError::ConnectionFailed {
                name: name.to_string(),
                reason: format!("stored config is unreadable: {e}"),
            })?;

        tracing::info!(server_name = %name, "Restarting MCP server");
        self.notify_consumers().await;
        tokio::time::sleep(RESTART_DELAY).await;

        self.remove_connection(name).await;
        let conn = self.connect_server(name, config).await;
        let outcome = if conn.status == ServerStatus::Connected {
            Ok(())
        } else {
            Err(HubError::ConnectionFailed {
                name: name.to_string(),
                reason: conn.error.clone(),
            })
        };
        self.insert_connection(conn, Some(index)).await;

        self.notify_consumers().await;
        outcome
    }

    /// Persist the disabled flag and update in-memory state.
    ///
    /// A pure visibility gate: the live connection is never torn down
    /// or rebuilt. On a connected server the cached capability lists
    /// are refreshed.
    pub async fn toggle_server_disabled(
        self: &Arc<Self>,
        name: &str,
        disabled: bool,
    ) -> Result<(), HubError> {
        let updated = self
            .store
            .mutate(name, |config| config.disabled = Some(disabled))
            .await?;

        let connected = {
            let mut state = self.state.write().await;
            state
                .connections
                .iter_mut()
                .find(|c| c.name == name)
                .is_some_and(|conn| {
                    conn.set_config(updated);
                    conn.status == ServerStatus::Connected
                })
        };

        if connected {
            self.refresh_capabilities(name).await;
        }

        self.notify_consumers().await;
        Ok(())
    }

    /// Idempotently add or remove a tool on the persisted alwaysAllow
    /// list, then re-derive the cached tool flags.
    pub async fn toggle_tool_always_allow(
        self: &Arc<Self>,
        name: &str,
        tool: &str,
        allow: bool,
    ) -> Result<(), HubError> {
        let updated = self
            .store
            .mutate(name, |config| {
                let mut list = config.always_allow.take().unwrap_or_default();
                if allow {
                    if !list.iter().any(|t| t == tool) {
                        list.push(tool.to_string());
                    }
                } else {
                    list.retain(|t| t != tool);
                }
                config.always_allow = Some(list);
            })
            .await?;

        {
            let mut state = self.state.write().await;
            if let Some(conn) = state.connections.iter_mut().find(|c| c.name == name) {
                conn.set_config(updated);
                conn.refresh_tool_flags();
            }
        }

        self.notify_consumers().await;
        Ok(())
    }

    /// Persist a new per-server timeout; affects subsequent calls only.
    pub async fn update_server_timeout(
        self: &Arc<Self>,
        name: &str,
        seconds: u64,
    ) -> Result<(), HubError> {
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&seconds) {
            return Err(HubError::InvalidTimeout(seconds));
        }

        let updated = self
            .store
            .mutate(name, |config| config.timeout = Some(seconds))
            .await?;

        {
            let mut state = self.state.write().await;
            if let Some(conn) = state.connections.iter_mut().find(|c| c.name == name) {
                conn.set_config(updated);
            }
        }

        self.notify_consumers().await;
        Ok(())
    }

    /// Call a tool on the named server.
    ///
    /// Rejects before any I/O when no connection exists or the entry
    /// is disabled. The timeout is re-derived from the stored config
    /// at each invocation.
    pub async fn call_tool(
        &self,
        name: &str,
        tool: &str,
        arguments: Option<Value>,
    ) -> Result<Value, HubError> {
        let (client, timeout) = self.usable_client(name).await?;
        client
            .call_tool(tool, arguments, timeout)
            .await
            .map_err(|e| Self::request_error(name, timeout, e))
    }

    /// Read a resource from the named server; same gating as
    /// [`Self::call_tool`].
    pub async fn read_resource(&self, name: &str, uri: &str) -> Result<Value, HubError> {
        let (client, timeout) = self.usable_client(name).await?;
        client
            .read_resource(uri, timeout)
            .await
            .map_err(|e| Self::request_error(name, timeout, e))
    }

    async fn usable_client(&self, name: &str) -> Result<(Arc<McpClient>, Duration), HubError> {
        let state = self.state.read().await;
        let conn = state
            .connections
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| HubError::NoConnection(name.to_string()))?;

        if conn.config.is_disabled() {
            return Err(HubError::ServerDisabled(name.to_string()));
        }

        let client = conn
            .client
            .clone()
            .ok_or_else(|| HubError::NoConnection(name.to_string()))?;
        Ok((client, conn.request_timeout()))
    }

    fn request_error(name: &str, timeout: Duration, error: TransportError) -> HubError {
        match error {
            TransportError::Timeout => HubError::RequestTimeout {
                name: name.to_string(),
                secs: timeout.as_secs(),
            },
            other => HubError::RequestFailed {
                name: name.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Re-fetch cached capability lists for a connected server.
    async fn refresh_capabilities(&self, name: &str) {
        let Some((client, timeout)) = ({
            let state = self.state.read().await;
            state
                .connections
                .iter()
                .find(|c| c.name == name)
                .and_then(|conn| conn.client.clone().map(|client| (client, conn.request_timeout())))
        }) else {
            return;
        };

        let tools = client.list_tools(timeout).await.unwrap_or_default();
        let resources = client.list_resources(timeout).await.unwrap_or_default();
        let templates = client
            .list_resource_templates(timeout)
            .await
            .unwrap_or_default();

        let mut state = self.state.write().await;
        if let Some(conn) = state.connections.iter_mut().find(|c| c.name == name) {
            conn.tools = tools;
            conn.resources = resources;
            conn.resource_templates = templates;
            conn.refresh_tool_flags();
        }
    }

    /// Broadcast the full ordered server list.
    async fn notify_consumers(&self) {
        let snapshots = self.get_all_servers().await;
        self.emitter.emit(HubEvent::servers_updated(snapshots));
    }

    /// Stop watchers, close every connection, clear collections. No
    /// subprocess or watcher outlives this call; individual close
    /// failures are swallowed and logged by the layers below.
    pub async fn dispose(&self) {
        if let Ok(mut slot) = self.settings_watcher.lock() {
            if let Some(watcher) = slot.take() {
                watcher.stop();
            }
        }

        let connections = {
            let mut state = self.state.write().await;
            state.watchers.clear();
            std::mem::take(&mut state.connections)
        };

        for mut conn in connections {
            conn.close().await;
        }

        tracing::info!("MCP hub disposed");
    }
}
