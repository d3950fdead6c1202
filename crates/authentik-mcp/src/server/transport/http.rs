//! HTTP transport: JSON-RPC over `POST /mcp`.
//!
//! With an [`OAuthProvider`] attached, the provider's routes are mounted next
//! to `/mcp` and every MCP request must authenticate. The caller's identity is
//! passed to handlers as the `user` context entry.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::{Extensions, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::Transport;
use crate::auth::{Identity, OAuthProvider};
use crate::error::{ServerError, ServerResult};
use crate::server::McpHandle;
use crate::server::protocol::{JsonRpcRequest, JsonRpcResponse, PARSE_ERROR};
use crate::server::tool::ToolContext;

/// Path of the MCP endpoint.
pub const MCP_PATH: &str = "/mcp";

/// Shared state for HTTP handlers.
#[derive(Clone)]
struct HttpState {
    handle: McpHandle,
    provider: Option<Arc<dyn OAuthProvider>>,
    base_url: String,
}

/// Serves MCP over HTTP.
pub struct HttpTransport {
    addr: SocketAddr,
    base_url: Option<String>,
    provider: Option<Arc<dyn OAuthProvider>>,
    local_addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, base_url: None, provider: None, local_addr: None, shutdown: None, task: None }
    }

    /// Require authentication through `provider` and mount its routes.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Public URL of this server, used in `WWW-Authenticate` challenges.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    /// Address actually bound, once started.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| {
            format!("http://{}", self.local_addr.unwrap_or(self.addr))
        })
    }

    /// Build the router serving `handle`.
    pub fn router(&self, handle: McpHandle) -> Router {
        let state = HttpState {
            handle,
            provider: self.provider.clone(),
            base_url: self.base_url(),
        };

        let mcp = Router::new()
            .route(MCP_PATH, post(handle_mcp_post))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
            .route("/health", get(health_check))
            .with_state(state);

        let router = match &self.provider {
            Some(provider) => Arc::clone(provider).setup_routes(mcp),
            None => mcp,
        };

        router.layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http())
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("addr", &self.addr)
            .field("local_addr", &self.local_addr)
            .field("auth", &self.provider.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn start(&mut self, handle: McpHandle) -> ServerResult<()> {
        if self.task.is_some() {
            return Err(ServerError::transport("HTTP transport already running"));
        }

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        self.local_addr = Some(listener.local_addr()?);
        let router = self.router(handle);

        let (tx, rx) = oneshot::channel::<()>();
        self.shutdown = Some(tx);

        tracing::info!(addr = %self.base_url(), "HTTP server listening");

        self.task = Some(tokio::spawn(async move {
            let shutdown = async {
                rx.await.ok();
            };
            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(shutdown).await {
                tracing::error!(error = %e, "HTTP server failed");
            }
            tracing::info!("HTTP server shut down");
        }));

        Ok(())
    }

    async fn stop(&mut self) -> ServerResult<()> {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| ServerError::transport(format!("HTTP task: {e}")))?;
        }
        self.local_addr = None;
        Ok(())
    }
}

async fn health_check(State(state): State<HttpState>) -> impl IntoResponse {
    let config = state.handle.server_config();
    Json(serde_json::json!({
        "status": "ok",
        "service": config.name,
        "version": config.version
    }))
}

/// Resolve the caller through the provider; 401 with a resource metadata
/// challenge when that fails.
async fn require_auth(State(state): State<HttpState>, mut request: Request, next: Next) -> Response {
    let Some(provider) = &state.provider else {
        return next.run(request).await;
    };

    match provider.authenticate(request.headers()).await {
        Ok(Some(identity)) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Ok(None) => unauthorized(&state.base_url),
        Err(e) => {
            tracing::warn!(error = %e, "Authentication failed");
            unauthorized(&state.base_url)
        }
    }
}

fn unauthorized(base_url: &str) -> Response {
    let challenge = format!(
        "Bearer resource_metadata=\"{base_url}/.well-known/oauth-protected-resource\""
    );
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, challenge)],
        Json(serde_json::json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

/// `POST /mcp`
async fn handle_mcp_post(
    State(state): State<HttpState>,
    extensions: Extensions,
    body: Bytes,
) -> Response {
    let request = match serde_json::from_slice::<JsonRpcRequest>(&body) {
        Ok(request) => request,
        Err(e) => {
            let error = JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {e}"));
            return (StatusCode::BAD_REQUEST, Json(error)).into_response();
        }
    };
    tracing::debug!(method = %request.method, "Handling MCP POST request");

    let mut extra = ToolContext::new();
    if let Some(identity) = extensions.get::<Identity>() {
        match serde_json::to_value(identity) {
            Ok(user) => {
                extra.insert("user".into(), user);
            }
            Err(e) => tracing::warn!(error = %e, "Could not encode identity"),
        }
    }

    match state.handle.dispatch(request, extra).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
