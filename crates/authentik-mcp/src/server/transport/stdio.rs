//! Stdio transport for MCP protocol.
//!
//! Handles JSON-RPC 2.0 over stdin/stdout, one message per line.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::Transport;
use crate::error::{ServerError, ServerResult};
use crate::server::McpHandle;
use crate::server::protocol::{JsonRpcRequest, JsonRpcResponse, PARSE_ERROR};
use crate::server::tool::ToolContext;

/// Serves MCP on the process's stdin and stdout.
#[derive(Debug, Default)]
pub struct StdioTransport {
    task: Option<JoinHandle<()>>,
    on_close: Option<Arc<Notify>>,
}

impl StdioTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify `signal` once stdin reaches EOF.
    #[must_use]
    pub fn with_close_notify(mut self, signal: Arc<Notify>) -> Self {
        self.on_close = Some(signal);
        self
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn name(&self) -> &str {
        "stdio"
    }

    async fn start(&mut self, handle: McpHandle) -> ServerResult<()> {
        if self.task.is_some() {
            return Err(ServerError::transport("stdio transport already running"));
        }

        let on_close = self.on_close.clone();
        self.task = Some(tokio::spawn(async move {
            let reader = BufReader::new(tokio::io::stdin());
            if let Err(e) = serve_lines(&handle, reader, tokio::io::stdout()).await {
                tracing::error!(error = %e, "Stdio transport failed");
            }
            if let Some(signal) = on_close {
                signal.notify_one();
            }
        }));

        tracing::info!("MCP stdio server ready, waiting for requests...");
        Ok(())
    }

    async fn stop(&mut self) -> ServerResult<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}

/// Read requests line by line until EOF, writing one response line per request.
pub async fn serve_lines<R, W>(handle: &McpHandle, mut reader: R, mut writer: W) -> ServerResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            tracing::info!("Stdin closed, shutting down");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => handle.dispatch(request, ToolContext::new()).await,
            Err(e) => Some(JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {e}"))),
        };

        if let Some(response) = response {
            let mut json = serde_json::to_vec(&response)
                .map_err(|e| ServerError::transport(format!("encode response: {e}")))?;
            json.push(b'\n');
            writer.write_all(&json).await?;
            writer.flush().await?;
        }
    }

    Ok(())
}
