//! Stdio transport for MCP servers spawned as child processes.
//!
//! JSON-RPC messages are exchanged as newline-delimited JSON over the
//! child's stdin/stdout. Responses are matched to requests by id through
//! a pending-request map fed by a background reader task.

use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Parameters for spawning a stdio MCP server.
#[derive(Debug, Clone, Default)]
pub struct StdioParams {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Stdio transport over a spawned child process.
pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    stdin: AsyncMutex<ChildStdin>,
    pending: PendingMap,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the server process and start the response reader.
    pub fn spawn(params: &StdioParams) -> McpResult<Self> {
        let mut child = Command::new(&params.command)
            .args(&params.args)
            .envs(&params.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::transport("failed to open child stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::transport("failed to open child stdout"))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<JsonRpcResponse>(line) {
                    Ok(response) => {
                        let sender = reader_pending.lock().unwrap().remove(&response.id);
                        if let Some(sender) = sender {
                            let _ = sender.send(response);
                        }
                    }
                    Err(_) => {
                        // Server-initiated notifications have no id.
                        debug!(line = %line, "ignoring non-response message");
                    }
                }
            }
            debug!("stdio reader finished");
        });

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin: AsyncMutex::new(stdin),
            pending,
            reader: Mutex::new(Some(reader)),
        })
    }

    async fn write_line(&self, payload: &str) -> McpResult<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(payload.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        let (sender, receiver) = oneshot::channel();
        let id = request.id;
        self.pending.lock().unwrap().insert(id, sender);

        let payload = serde_json::to_string(&request)?;
        if let Err(error) = self.write_line(&payload).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(error);
        }

        match tokio::time::timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS), receiver).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(McpError::transport("server closed the connection")),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(McpError::Timeout(REQUEST_TIMEOUT_SECS))
            }
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        let payload = serde_json::to_string(&notification)?;
        self.write_line(&payload).await
    }

    async fn close(&self) -> McpResult<()> {
        if let Some(reader) = self.reader.lock().unwrap().take() {
            reader.abort();
        }
        if let Some(mut child) = self.child.lock().unwrap().take() {
            if let Err(error) = child.start_kill() {
                warn!(error = %error, "failed to kill mcp server process");
            }
        }
        self.pending.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_command_fails() {
        let params = StdioParams {
            command: "/nonexistent/mcp-server-binary".to_string(),
            ..Default::default()
        };
        assert!(StdioTransport::spawn(&params).is_err());
    }

    #[tokio::test]
    async fn test_echo_server_roundtrip() {
        // `cat` echoes requests back verbatim; a JSON-RPC request is its
        // own well-formed response envelope for id matching purposes.
        let params = StdioParams {
            command: "cat".to_string(),
            ..Default::default()
        };
        let transport = match StdioTransport::spawn(&params) {
            Ok(transport) => transport,
            // Environment without `cat`; nothing to test.
            Err(_) => return,
        };

        let request = JsonRpcRequest::new(7, "tools/list", None);
        let response = transport.request(request).await.unwrap();
        assert_eq!(response.id, 7);

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let params = StdioParams {
            command: "cat".to_string(),
            ..Default::default()
        };
        if let Ok(transport) = StdioTransport::spawn(&params) {
            assert!(transport.close().await.is_ok());
            assert!(transport.close().await.is_ok());
        }
    }
}
