//! Transport layer implementations.
//!
//! - [`StdioTransport`]: line-delimited JSON-RPC over stdin/stdout
//! - [`HttpTransport`]: JSON-RPC over `POST /mcp`, optionally behind OAuth

pub mod http;
pub mod stdio;

use async_trait::async_trait;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use super::McpHandle;
use crate::error::ServerResult;

/// A channel that carries MCP requests to the server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Begin serving. Returns once the transport is accepting requests.
    async fn start(&mut self, handle: McpHandle) -> ServerResult<()>;

    /// Stop serving and release resources.
    async fn stop(&mut self) -> ServerResult<()>;
}
