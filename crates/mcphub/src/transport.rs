//! Stdio transport: a spawned child process speaking line-delimited
//! JSON-RPC 2.0 on stdin/stdout.
//!
//! Stderr output and process exit surface on the transport event
//! stream; the supervisor decides what they mean for connection state.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use mcphub_core::{ServerConfig, Transport, TransportError, TransportEvent, TransportFactory};

/// Buffered out-of-band events before the monitor task attaches.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// JSON-RPC 2.0 request.
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<u64>,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Transport over a spawned child process.
pub struct StdioTransport {
    name: String,
    config: ServerConfig,
    session: Mutex<Option<Session>>,
    request_id: AtomicU64,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: std::sync::Mutex<Option<mpsc::Receiver<TransportEvent>>>,
}

impl StdioTransport {
    /// Create an unstarted transport for one server entry.
    #[must_use]
    pub fn new(name: impl Into<String>, config: ServerConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            config,
            session: Mutex::new(None),
            request_id: AtomicU64::new(1),
            events_tx,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
        }
    }

    fn report(&self, event: TransportEvent) {
        // Monitor may have detached already; nothing to do then.
        let _ = self.events_tx.try_send(event);
    }

    async fn write_line(session: &mut Session, line: &str) -> Result<(), TransportError> {
        session.stdin.write_all(line.as_bytes()).await?;
        session.stdin.write_all(b"\n").await?;
        session.stdin.flush().await?;
        Ok(())
    }

    /// Read response lines until one matches `id`, skipping diagnostic
    /// noise and server-initiated messages.
    async fn read_response(
        &self,
        session: &mut Session,
        id: u64,
    ) -> Result<JsonRpcResponse, TransportError> {
        loop {
            let line = match session.stdout.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.report(TransportEvent::Closed);
                    return Err(TransportError::Protocol(
                        "server closed its stdout".to_string(),
                    ));
                }
                Err(e) => {
                    self.report(TransportEvent::Error(e.to_string()));
                    return Err(TransportError::Io(e));
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(response) if response.id == Some(id) => return Ok(response),
                Ok(_) => {
                    // Response to someone else, or a server-side request
                    tracing::debug!(server_name = %self.name, "Skipping unmatched JSON-RPC message");
                }
                Err(_) => {
                    tracing::debug!(server_name = %self.name, line = trimmed, "Skipping non-JSON-RPC output");
                }
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&self) -> Result<(), TransportError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(self.config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(env) = &self.config.env {
            command.envs(env);
        }

        let mut child = command.spawn().map_err(|e| {
            TransportError::SpawnFailed(format!(
                "failed to spawn '{}': {e} (args: {:?})",
                self.config.command,
                self.config.args()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::SpawnFailed("failed to open stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::SpawnFailed("failed to open stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::SpawnFailed("failed to open stderr".to_string()))?;

        // Forward stderr lines as diagnostics; EOF means the process
        // went away.
        let events = self.events_tx.clone();
        let server_name = self.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(server_name = %server_name, line = %line, "MCP server stderr");
                if events.send(TransportEvent::Stderr(line)).await.is_err() {
                    return;
                }
            }
            let _ = events.send(TransportEvent::Closed).await;
        });

        let mut session = self.session.lock().await;
        *session = Some(Session {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        });

        Ok(())
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        request_timeout: Duration,
    ) -> Result<Value, TransportError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(TransportError::NotStarted)?;

        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        };
        let line = serde_json::to_string(&request)?;

        let response = timeout(request_timeout, async {
            Self::write_line(session, &line).await?;
            self.read_response(session, id).await
        })
        .await
        .map_err(|_| TransportError::Timeout)??;

        if let Some(err) = response.error {
            return Err(TransportError::ServerError {
                code: err.code,
                message: err.message,
            });
        }

        response
            .result
            .ok_or_else(|| TransportError::Protocol("missing result in response".to_string()))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(TransportError::NotStarted)?;

        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or_else(|| json!({})),
        });
        let line = serde_json::to_string(&notification)?;
        Self::write_line(session, &line).await
    }

    fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.lock().ok().and_then(|mut slot| slot.take())
    }

    async fn close(&self) {
        let mut guard = self.session.lock().await;
        if let Some(mut session) = guard.take() {
            // Drop stdin first to signal EOF, then reap.
            drop(session.stdin);
            if let Err(e) = session.child.kill().await {
                tracing::warn!(server_name = %self.name, error = %e, "Failed to kill MCP server process");
            }
        }
    }
}

/// Factory producing stdio transports; the production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioTransportFactory;

impl TransportFactory for StdioTransportFactory {
    fn create(&self, name: &str, config: &ServerConfig) -> Arc<dyn Transport> {
        Arc::new(StdioTransport::new(name, config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_omits_empty_params() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "tools/list".to_string(),
            params: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#;
        let response: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.id, Some(1));
        assert!(response.result.is_some());
        assert!(response.error.is_none());
    }

    #[test]
    fn test_error_response_parsing() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"Invalid Request"}}"#;
        let response: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.error.as_ref().unwrap().code, -32600);
    }

    #[tokio::test]
    async fn test_request_before_start_fails() {
        let transport = StdioTransport::new("t", ServerConfig::new("true", vec![]));
        let result = transport
            .request("tools/list", None, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(TransportError::NotStarted)));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let transport = StdioTransport::new(
            "t",
            ServerConfig::new("mcphub-test-no-such-binary", vec![]),
        );
        let result = transport.start().await;
        assert!(matches!(result, Err(TransportError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_take_events_is_single_shot() {
        let transport = StdioTransport::new("t", ServerConfig::new("true", vec![]));
        assert!(transport.take_events().is_some());
        assert!(transport.take_events().is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = StdioTransport::new("t", ServerConfig::new("true", vec![]));
        transport.close().await;
        transport.close().await;
    }
}
