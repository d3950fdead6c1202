//! Authentik MCP
//!
//! An OAuth 2.0 / OpenID Connect provider adapter for
//! [Authentik](https://goauthentik.io), plus a thin Model Context Protocol
//! server that can sit behind it.
//!
//! # Features
//!
//! - **Discovery**: the provider's OpenID configuration is fetched once and cached
//! - **Login flow**: authorization URL, code exchange, session cookie routes
//! - **Bearer tokens**: verified against the userinfo endpoint, no local JWT checks
//! - **Group policy**: optional allow-list of Authentik groups
//! - **Metadata**: RFC 8414 / RFC 9728 documents and RFC 7591 registration
//! - **MCP**: tools, resources and prompts over stdio or HTTP
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use authentik_mcp::{AuthentikConfig, AuthentikProvider, McpServer, ServerConfig};
//! use authentik_mcp::server::HttpTransport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = Arc::new(AuthentikProvider::new(AuthentikConfig::from_env()?)?);
//!
//!     let mut server = McpServer::new(ServerConfig::default());
//!     server.use_transport(
//!         HttpTransport::new(([0, 0, 0, 0], 3000).into()).with_provider(provider),
//!     )?;
//!     server.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod server;

pub use auth::{AuthentikProvider, Identity, OAuthProvider};
pub use config::{AuthentikConfig, ServerConfig};
pub use error::{AuthError, ServerError, ToolError};
pub use server::McpServer;
