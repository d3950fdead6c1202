//! Authentik OAuth 2.0 / OpenID Connect provider adapter.
//!
//! Components, leaves first:
//! - [`discovery`]: fetches and caches the OpenID configuration
//! - [`authorize`]: builds the authorization URL
//! - [`token`]: code / refresh exchange and best-effort revocation
//! - [`identity`]: userinfo and login profile normalization, group policy
//! - [`registration`]: RFC 7591 dynamic client registration
//!
//! [`AuthentikProvider`] composes them behind the [`OAuthProvider`] trait,
//! which is what the MCP HTTP transport consumes.
//!
//! ## Supported Standards
//! - RFC 6749: Authorization Code Grant
//! - RFC 7009: Token Revocation (best effort)
//! - RFC 7591: Dynamic Client Registration
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 9728: OAuth Protected Resource Metadata

pub mod authorize;
pub mod discovery;
pub mod identity;
pub mod metadata;
pub mod pkce;
pub mod provider;
pub mod registration;
pub mod routes;
pub mod session;
pub mod token;
mod types;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::http::HeaderMap;

pub use identity::{GroupPolicy, ProfileSource};
pub use metadata::{OAuthDiscovery, ProtectedResourceMetadata};
pub use provider::AuthentikProvider;
pub use session::{MemorySessionStore, SessionStore};
pub use types::{
    ClientRegistrationRequest, ClientRegistrationResponse, DiscoveryDocument, Identity,
    TokenResult, TokenTypeHint,
};

use crate::error::AuthResult;

/// An OAuth provider the MCP server can authenticate against.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// URL that starts the login flow.
    async fn get_auth_url(
        &self,
        state: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> AuthResult<String>;

    /// Exchange an authorization code for tokens.
    async fn handle_callback(
        &self,
        code: &str,
        state: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> AuthResult<TokenResult>;

    /// Resolve a bearer token. `Ok(None)` means unauthenticated.
    async fn verify_token(&self, token: &str) -> AuthResult<Option<Identity>>;

    /// Exchange a refresh token for new tokens.
    async fn refresh_token(&self, refresh_token: &str) -> AuthResult<TokenResult>;

    /// Revoke a token. Never fails.
    async fn revoke_token(&self, token: &str, hint: TokenTypeHint);

    /// RFC 8414 metadata for a server hosted at `base_url`.
    fn discovery_metadata(&self, base_url: &str) -> OAuthDiscovery;

    /// RFC 9728 metadata for a resource hosted at `base_url`.
    fn protected_resource_metadata(&self, base_url: &str) -> ProtectedResourceMetadata;

    fn supports_dynamic_registration(&self) -> bool {
        false
    }

    async fn register_client(
        &self,
        request: &ClientRegistrationRequest,
    ) -> AuthResult<ClientRegistrationResponse>;

    /// Identify the caller of an inbound request, by bearer token first and
    /// session second.
    async fn authenticate(&self, headers: &HeaderMap) -> AuthResult<Option<Identity>>;

    /// Attach the provider's HTTP routes to `router`.
    fn setup_routes(self: Arc<Self>, router: Router) -> Router;
}
