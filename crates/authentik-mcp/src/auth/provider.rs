//! Authentik implementation of [`OAuthProvider`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::Router;
use axum::http::HeaderMap;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use tokio::task::JoinHandle;

use super::authorize::build_authorization_url;
use super::discovery::DiscoveryResolver;
use super::identity::{GroupPolicy, IdentityVerifier};
use super::metadata::{self, OAuthDiscovery, ProtectedResourceMetadata};
use super::registration::RegistrationHandler;
use super::session::{MemorySessionStore, SessionStore, session_id};
use super::token::TokenExchanger;
use super::types::{
    ClientRegistrationRequest, ClientRegistrationResponse, Identity, TokenResult, TokenTypeHint,
};
use super::{OAuthProvider, routes, session};
use crate::client::{HttpClient, ReqwestHttpClient};
use crate::config::AuthentikConfig;
use crate::error::{AuthError, AuthResult};

/// Authentik OAuth provider.
pub struct AuthentikProvider {
    config: Arc<AuthentikConfig>,
    discovery: DiscoveryResolver,
    tokens: TokenExchanger,
    identity: IdentityVerifier,
    registration: RegistrationHandler,
    sessions: Arc<dyn SessionStore>,
    initialized: AtomicBool,
    cleanup: OnceLock<JoinHandle<()>>,
}

impl AuthentikProvider {
    /// Create a provider backed by a reqwest client.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: AuthentikConfig) -> AuthResult<Self> {
        let http = ReqwestHttpClient::new(&config)
            .map_err(|e| AuthError::InvalidConfig(format!("HTTP client: {e}")))?;
        Self::with_http_client(config, Arc::new(http))
    }

    /// Create a provider using a caller-supplied HTTP client.
    pub fn with_http_client(
        config: AuthentikConfig,
        http: Arc<dyn HttpClient>,
    ) -> AuthResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Self {
            discovery: DiscoveryResolver::new(Arc::clone(&http), config.discovery_url()),
            tokens: TokenExchanger::new(Arc::clone(&http), Arc::clone(&config)),
            identity: IdentityVerifier::new(
                http,
                GroupPolicy::new(config.allowed_groups.clone()),
            ),
            registration: RegistrationHandler::new(Arc::clone(&config)),
            sessions: Arc::new(MemorySessionStore::new()),
            initialized: AtomicBool::new(false),
            cleanup: OnceLock::new(),
            config,
        })
    }

    /// Replace the session store.
    #[must_use]
    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Prepare the login flow by resolving the discovery document.
    ///
    /// Idempotent. The login and callback routes retry it on each request and
    /// answer 503 until it succeeds.
    pub async fn initialize(&self) -> AuthResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.discovery.resolve().await?;
        self.initialized.store(true, Ordering::Release);
        tracing::info!(
            issuer = %self.config.issuer(),
            groups_enforced = self.config.enforces_groups(),
            "Authentik provider initialized"
        );
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn config(&self) -> &AuthentikConfig {
        &self.config
    }

    #[must_use]
    pub const fn discovery(&self) -> &DiscoveryResolver {
        &self.discovery
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Public base URL used in metadata documents.
    ///
    /// Falls back to the origin of the redirect URI, then to the Authentik URL.
    #[must_use]
    pub fn base_url(&self) -> String {
        if let Some(base) = &self.config.public_base_url {
            return base.clone();
        }
        self.config
            .redirect_uri
            .as_deref()
            .and_then(|uri| url::Url::parse(uri).ok())
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|| self.config.url.clone())
    }

    /// Normalize a login profile and apply the group policy.
    pub fn from_auth_callback(&self, profile: serde_json::Value) -> AuthResult<Identity> {
        self.identity.from_auth_callback(profile)
    }

    /// Finish an interactive login: exchange the code, load the profile and
    /// resolve the identity.
    pub async fn complete_login(&self, code: &str, state: Option<&str>) -> AuthResult<Identity> {
        let tokens = self.handle_callback(code, state, None).await?;
        let discovery = self.discovery.resolve().await?;

        let profile = self
            .identity
            .fetch_userinfo(&discovery.userinfo_endpoint, &tokens.access_token)
            .await?
            .ok_or_else(|| AuthError::verification("freshly issued token was rejected"))?;

        self.from_auth_callback(profile)
    }

    /// Resolve a session cookie to its identity.
    pub async fn session_identity(&self, headers: &HeaderMap) -> Option<Identity> {
        let id = session_id(headers)?;
        self.sessions.get(&id).await
    }
}

#[async_trait]
impl OAuthProvider for AuthentikProvider {
    async fn get_auth_url(
        &self,
        state: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> AuthResult<String> {
        let discovery = self.discovery.resolve().await?;
        let url = build_authorization_url(
            &discovery.authorization_endpoint,
            &self.config,
            state,
            redirect_uri,
        )?;
        Ok(url.into())
    }

    async fn handle_callback(
        &self,
        code: &str,
        state: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> AuthResult<TokenResult> {
        let discovery = self.discovery.resolve().await?;
        self.tokens
            .exchange_code(&discovery.token_endpoint, code, state, redirect_uri)
            .await
    }

    async fn verify_token(&self, token: &str) -> AuthResult<Option<Identity>> {
        let discovery = self.discovery.resolve().await?;
        self.identity.verify_token(&discovery.userinfo_endpoint, token).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> AuthResult<TokenResult> {
        let discovery = self.discovery.resolve().await?;
        self.tokens.refresh(&discovery.token_endpoint, refresh_token).await
    }

    async fn revoke_token(&self, token: &str, hint: TokenTypeHint) {
        let discovery = match self.discovery.resolve().await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping token revocation");
                return;
            }
        };

        let Some(endpoint) = discovery.revocation_endpoint.as_deref() else {
            tracing::warn!("Authentik does not support token revocation");
            return;
        };

        self.tokens.revoke(endpoint, token, hint).await;
    }

    fn discovery_metadata(&self, base_url: &str) -> OAuthDiscovery {
        metadata::discovery_metadata(&self.config, base_url, self.supports_dynamic_registration())
    }

    fn protected_resource_metadata(&self, base_url: &str) -> ProtectedResourceMetadata {
        metadata::protected_resource_metadata(&self.config, base_url)
    }

    fn supports_dynamic_registration(&self) -> bool {
        // The pre-configured client is always available.
        true
    }

    async fn register_client(
        &self,
        request: &ClientRegistrationRequest,
    ) -> AuthResult<ClientRegistrationResponse> {
        self.registration.register(request)
    }

    async fn authenticate(&self, headers: &HeaderMap) -> AuthResult<Option<Identity>> {
        if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
            return self.verify_token(bearer.token()).await;
        }
        Ok(self.session_identity(headers).await)
    }

    fn setup_routes(self: Arc<Self>, router: Router) -> Router {
        if tokio::runtime::Handle::try_current().is_ok() {
            self.cleanup.get_or_init(|| session::spawn_cleanup(Arc::clone(&self.sessions)));
            if !self.is_initialized() {
                let provider = Arc::clone(&self);
                tokio::spawn(async move {
                    if let Err(e) = provider.initialize().await {
                        tracing::error!(error = %e, "Authentik provider initialization failed");
                    }
                });
            }
        }
        router.merge(routes::auth_router(self))
    }
}

impl Drop for AuthentikProvider {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup.get() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for AuthentikProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthentikProvider")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
