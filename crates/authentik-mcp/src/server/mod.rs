//! MCP server wrapper.
//!
//! [`McpServer`] keeps registries of tools, resources and prompts plus a
//! shared context map, and hands an [`McpHandle`] to each configured
//! [`Transport`]. Transports decode JSON-RPC and call [`McpHandle::dispatch`].

pub mod prompt;
pub mod protocol;
pub mod resource;
pub mod tool;
pub mod transport;

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use serde_json::Value;

pub use prompt::{PromptArgument, PromptConfig, PromptHandler, PromptMessage, Role};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use resource::{ResourceConfig, ResourceHandler};
pub use tool::{ToolConfig, ToolContext, ToolHandler};
pub use transport::{HttpTransport, StdioTransport, Transport};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

#[derive(Clone)]
pub(crate) struct RegisteredTool {
    pub(crate) config: ToolConfig,
    pub(crate) handler: Arc<dyn ToolHandler>,
}

#[derive(Clone)]
pub(crate) struct RegisteredResource {
    pub(crate) config: ResourceConfig,
    pub(crate) handler: Arc<dyn ResourceHandler>,
}

#[derive(Clone)]
pub(crate) struct RegisteredPrompt {
    pub(crate) config: PromptConfig,
    pub(crate) handler: Arc<dyn PromptHandler>,
}

/// Registries shared between the server and its transports.
pub(crate) struct ServerState {
    pub(crate) config: ServerConfig,
    tools: RwLock<BTreeMap<String, RegisteredTool>>,
    resources: RwLock<BTreeMap<String, RegisteredResource>>,
    prompts: RwLock<BTreeMap<String, RegisteredPrompt>>,
    context: RwLock<ToolContext>,
}

// Handlers run outside these locks, so a poisoned lock still holds consistent data.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

impl ServerState {
    pub(crate) fn tools(&self) -> RwLockReadGuard<'_, BTreeMap<String, RegisteredTool>> {
        read(&self.tools)
    }

    pub(crate) fn resources(&self) -> RwLockReadGuard<'_, BTreeMap<String, RegisteredResource>> {
        read(&self.resources)
    }

    pub(crate) fn prompts(&self) -> RwLockReadGuard<'_, BTreeMap<String, RegisteredPrompt>> {
        read(&self.prompts)
    }
}

fn insert_unique<T>(
    lock: &RwLock<BTreeMap<String, T>>,
    kind: &'static str,
    name: String,
    entry: T,
) -> ServerResult<()> {
    let mut map = lock.write().unwrap_or_else(PoisonError::into_inner);
    if map.contains_key(&name) {
        return Err(ServerError::DuplicateRegistration { kind, name });
    }
    tracing::debug!(kind, name = %name, "Registered");
    map.insert(name, entry);
    Ok(())
}

/// Cheap handle transports use to dispatch requests.
#[derive(Clone)]
pub struct McpHandle {
    state: Arc<ServerState>,
}

impl McpHandle {
    /// Copy of the server-wide context.
    #[must_use]
    pub fn context(&self) -> ToolContext {
        read(&self.state.context).clone()
    }

    #[must_use]
    pub fn server_config(&self) -> &ServerConfig {
        &self.state.config
    }
}

impl std::fmt::Debug for McpHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpHandle").field("server", &self.state.config.name).finish()
    }
}

/// MCP server.
pub struct McpServer {
    handle: McpHandle,
    transports: Vec<Box<dyn Transport>>,
    started: bool,
}

impl McpServer {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let state = ServerState {
            config,
            tools: RwLock::default(),
            resources: RwLock::default(),
            prompts: RwLock::default(),
            context: RwLock::default(),
        };
        Self { handle: McpHandle { state: Arc::new(state) }, transports: Vec::new(), started: false }
    }

    /// Register a tool under a unique name.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DuplicateRegistration`] if the name is taken.
    pub fn register_tool<H>(
        &self,
        name: impl Into<String>,
        config: ToolConfig,
        handler: H,
    ) -> ServerResult<()>
    where
        H: ToolHandler + 'static,
    {
        let entry = RegisteredTool { config, handler: Arc::new(handler) };
        insert_unique(&self.handle.state.tools, "Tool", name.into(), entry)
    }

    /// Register a resource under a unique name.
    pub fn register_resource<H>(
        &self,
        name: impl Into<String>,
        config: ResourceConfig,
        handler: H,
    ) -> ServerResult<()>
    where
        H: ResourceHandler + 'static,
    {
        let entry = RegisteredResource { config, handler: Arc::new(handler) };
        insert_unique(&self.handle.state.resources, "Resource", name.into(), entry)
    }

    /// Register a prompt under a unique name.
    pub fn register_prompt<H>(
        &self,
        name: impl Into<String>,
        config: PromptConfig,
        handler: H,
    ) -> ServerResult<()>
    where
        H: PromptHandler + 'static,
    {
        let entry = RegisteredPrompt { config, handler: Arc::new(handler) };
        insert_unique(&self.handle.state.prompts, "Prompt", name.into(), entry)
    }

    /// Merge `values` into the shared context. Later keys win.
    pub fn set_context(&self, values: ToolContext) {
        self.handle
            .state
            .context
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(values);
    }

    /// Convenience for a single context entry.
    pub fn set_context_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut values = ToolContext::new();
        values.insert(key.into(), value.into());
        self.set_context(values);
    }

    #[must_use]
    pub fn context(&self) -> ToolContext {
        self.handle.context()
    }

    /// Add a transport. Only allowed before [`start`](Self::start).
    pub fn use_transport(&mut self, transport: impl Transport + 'static) -> ServerResult<()> {
        if self.started {
            return Err(ServerError::TransportAfterStart);
        }
        self.transports.push(Box::new(transport));
        Ok(())
    }

    /// Start every configured transport.
    ///
    /// # Errors
    ///
    /// Fails when no transport is configured, the server already runs, or a
    /// transport fails to start.
    pub async fn start(&mut self) -> ServerResult<()> {
        if self.started {
            return Err(ServerError::AlreadyStarted);
        }
        if self.transports.is_empty() {
            return Err(ServerError::NoTransports);
        }

        for transport in &mut self.transports {
            tracing::info!(transport = transport.name(), "Starting transport");
            transport.start(self.handle.clone()).await?;
        }

        self.started = true;
        tracing::info!(
            server = %self.handle.state.config.name,
            tools = self.handle.state.tools().len(),
            "MCP server started"
        );
        Ok(())
    }

    /// Stop every transport.
    pub async fn stop(&mut self) -> ServerResult<()> {
        if !self.started {
            return Err(ServerError::NotStarted);
        }

        for transport in &mut self.transports {
            if let Err(e) = transport.stop().await {
                tracing::warn!(transport = transport.name(), error = %e, "Transport failed to stop");
            }
        }

        self.started = false;
        tracing::info!("MCP server stopped");
        Ok(())
    }

    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Handle shared with transports; also useful for in-process dispatch.
    #[must_use]
    pub fn handle(&self) -> McpHandle {
        self.handle.clone()
    }

    /// Registered tool names with their configs.
    #[must_use]
    pub fn list_tools(&self) -> Vec<(String, ToolConfig)> {
        self.handle
            .state
            .tools()
            .iter()
            .map(|(name, tool)| (name.clone(), tool.config.clone()))
            .collect()
    }

    #[must_use]
    pub fn list_resources(&self) -> Vec<(String, ResourceConfig)> {
        self.handle
            .state
            .resources()
            .iter()
            .map(|(name, r)| (name.clone(), r.config.clone()))
            .collect()
    }

    #[must_use]
    pub fn list_prompts(&self) -> Vec<(String, PromptConfig)> {
        self.handle
            .state
            .prompts()
            .iter()
            .map(|(name, p)| (name.clone(), p.config.clone()))
            .collect()
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("name", &self.handle.state.config.name)
            .field("tools", &self.handle.state.tools().len())
            .field("transports", &self.transports.len())
            .field("started", &self.started)
            .finish()
    }
}
