//! Authentik MCP Server - Entry Point
//!
//! Serves a small demo tool set over stdio or over HTTP behind Authentik.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tokio::sync::Notify;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use authentik_mcp::error::{ToolError, ToolResult};
use authentik_mcp::server::{HttpTransport, StdioTransport, ToolConfig, ToolContext};
use authentik_mcp::{AuthentikConfig, AuthentikProvider, McpServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "authentik-mcp")]
#[command(about = "MCP server authenticated by Authentik")]
#[command(version)]
struct Cli {
    /// Transport mode: stdio or http
    #[arg(long, default_value = "stdio")]
    transport: Transport,

    /// HTTP server port (only used with --transport http)
    #[arg(long, default_value = "3000", env = "PORT")]
    port: u16,

    /// Public base URL of this server (e.g., https://mcp.example.com)
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Serve HTTP without authentication
    #[arg(long)]
    no_auth: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Transport {
    /// Standard input/output
    #[default]
    Stdio,
    /// HTTP, authenticated through Authentik
    Http,
}

/// Logs go to stderr; stdout carries the stdio protocol.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

async fn whoami(ctx: ToolContext, _input: Value) -> ToolResult<String> {
    match ctx.get("user") {
        Some(user) => Ok(serde_json::to_string_pretty(user)?),
        None => Ok("Not authenticated".to_string()),
    }
}

async fn echo(_ctx: ToolContext, input: Value) -> ToolResult<String> {
    input
        .get("message")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| ToolError::validation("message", "must be a string"))
}

fn register_tools(server: &McpServer) -> anyhow::Result<()> {
    server.register_tool(
        "whoami",
        ToolConfig::new("Show the authenticated Authentik user").with_title("Who am I"),
        whoami,
    )?;
    server.register_tool(
        "echo",
        ToolConfig::new("Echo a message back").with_input_schema(serde_json::json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"]
        })),
        echo,
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?cli.transport,
        "Starting Authentik MCP server"
    );

    let mut server = McpServer::new(ServerConfig::default());
    register_tools(&server)?;

    let stdin_closed = Arc::new(Notify::new());

    match cli.transport {
        Transport::Stdio => {
            server.use_transport(
                StdioTransport::new().with_close_notify(Arc::clone(&stdin_closed)),
            )?;
        }
        Transport::Http => {
            let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
            let mut http = HttpTransport::new(addr);
            if let Some(base_url) = &cli.base_url {
                http = http.with_base_url(base_url);
            }
            if cli.no_auth {
                tracing::warn!("Authentication disabled");
            } else {
                let config = AuthentikConfig::from_env()?;
                tracing::info!(issuer = %config.issuer(), "Using Authentik");
                http = http.with_provider(Arc::new(AuthentikProvider::new(config)?));
            }
            server.use_transport(http)?;
        }
    }

    server.start().await?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Received shutdown signal");
        }
        () = stdin_closed.notified() => {}
    }
    server.stop().await?;

    Ok(())
}
