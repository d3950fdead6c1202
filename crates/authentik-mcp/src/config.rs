//! Configuration for the Authentik adapter and the MCP server wrapper.

use std::time::Duration;

use crate::auth::pkce;
use crate::error::{AuthError, AuthResult};

/// Authentik URL conventions and client defaults.
pub mod paths {
    use std::time::Duration;

    /// Prefix of every OAuth endpoint Authentik exposes.
    pub const OAUTH_PREFIX: &str = "/application/o";

    /// Scopes requested when none are configured.
    pub const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email"];

    /// Request timeout.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Per-application issuer, `{url}/application/o/{slug}/`.
    #[must_use]
    pub fn issuer(url: &str, slug: &str) -> String {
        format!("{url}{OAUTH_PREFIX}/{slug}/")
    }

    /// OpenID configuration document for one application.
    #[must_use]
    pub fn openid_configuration(url: &str, slug: &str) -> String {
        format!("{url}{OAUTH_PREFIX}/{slug}/.well-known/openid-configuration")
    }

    /// Provider-wide endpoint such as `authorize`, `token` or `userinfo`.
    #[must_use]
    pub fn endpoint(url: &str, name: &str) -> String {
        format!("{url}{OAUTH_PREFIX}/{name}/")
    }

    /// JWKS document for one application.
    #[must_use]
    pub fn jwks(url: &str, slug: &str) -> String {
        format!("{url}{OAUTH_PREFIX}/{slug}/jwks/")
    }
}

/// Authentik OAuth provider configuration.
#[derive(Clone)]
pub struct AuthentikConfig {
    /// Authentik base URL, without trailing slash.
    pub url: String,

    /// OAuth client identifier.
    pub client_id: String,

    /// Client secret. `None` for public clients.
    pub client_secret: Option<String>,

    /// Requested scopes, in order.
    pub scopes: Vec<String>,

    /// Default redirect URI for the authorization code flow.
    pub redirect_uri: Option<String>,

    /// Authentik application slug. Defaults to the client id.
    pub application_slug: String,

    /// Restrict access to members of these groups. Empty disables the check.
    pub allowed_groups: Vec<String>,

    /// API token for real dynamic client registration.
    pub registration_api_token: Option<String>,

    /// Extra query parameters appended to the authorization URL
    /// (e.g. `code_challenge` / `code_challenge_method`).
    pub extra_authorize_params: Vec<(String, String)>,

    /// Mark session cookies `Secure`.
    pub secure_cookies: bool,

    /// Public base URL of the server hosting the auth routes.
    pub public_base_url: Option<String>,

    /// Request timeout.
    pub request_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl AuthentikConfig {
    /// Create a configuration with the required fields and defaults elsewhere.
    #[must_use]
    pub fn new(url: impl Into<String>, client_id: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        let client_id = client_id.into();
        Self {
            url,
            application_slug: client_id.clone(),
            client_id,
            client_secret: None,
            scopes: paths::DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            redirect_uri: None,
            allowed_groups: Vec::new(),
            registration_api_token: None,
            extra_authorize_params: Vec::new(),
            secure_cookies: false,
            public_base_url: None,
            request_timeout: paths::REQUEST_TIMEOUT,
            connect_timeout: paths::CONNECT_TIMEOUT,
        }
    }

    /// Create a test configuration pointing at a mock server.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        let mut config = Self::new(base_url, "test-client");
        config.application_slug = "test-app".to_string();
        config.redirect_uri = Some("http://localhost:3000/auth/callback".to_string());
        config.request_timeout = Duration::from_secs(5);
        config.connect_timeout = Duration::from_secs(2);
        config
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if a required variable is missing or the result is invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        let url = std::env::var("AUTHENTIK_URL")
            .map_err(|_| anyhow::anyhow!("AUTHENTIK_URL is not set"))?;
        let client_id = std::env::var("AUTHENTIK_CLIENT_ID")
            .map_err(|_| anyhow::anyhow!("AUTHENTIK_CLIENT_ID is not set"))?;

        let mut config = Self::new(url, client_id);
        config.client_secret = non_empty_var("AUTHENTIK_CLIENT_SECRET");
        config.redirect_uri = non_empty_var("AUTHENTIK_REDIRECT_URI");
        config.registration_api_token = non_empty_var("AUTHENTIK_REGISTRATION_TOKEN");
        config.public_base_url = non_empty_var("BASE_URL");

        if let Some(slug) = non_empty_var("AUTHENTIK_APPLICATION_SLUG") {
            config.application_slug = slug;
        }
        if let Some(scopes) = non_empty_var("AUTHENTIK_SCOPES") {
            config.scopes = split_list(&scopes);
        }
        if let Some(groups) = non_empty_var("AUTHENTIK_ALLOWED_GROUPS") {
            config.allowed_groups = split_list(&groups);
        }
        config.secure_cookies = non_empty_var("AUTHENTIK_SECURE_COOKIES")
            .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes"));

        config.validate()?;
        Ok(config)
    }

    /// Set the client secret (confidential client).
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Replace the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the default redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Override the application slug.
    #[must_use]
    pub fn with_application_slug(mut self, slug: impl Into<String>) -> Self {
        self.application_slug = slug.into();
        self
    }

    /// Restrict access to the given groups.
    #[must_use]
    pub fn with_allowed_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Set the API token used for non-sentinel dynamic registration.
    #[must_use]
    pub fn with_registration_api_token(mut self, token: impl Into<String>) -> Self {
        self.registration_api_token = Some(token.into());
        self
    }

    /// Append an extra authorization URL parameter.
    #[must_use]
    pub fn with_authorize_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_authorize_params.push((key.into(), value.into()));
        self
    }

    /// Inject an S256 PKCE challenge derived from `code_verifier` into the
    /// authorization URL. The caller keeps the verifier for its own exchange.
    #[must_use]
    pub fn with_pkce_challenge(self, code_verifier: &str) -> Self {
        let challenge = pkce::s256_challenge(code_verifier);
        self.with_authorize_param("code_challenge", challenge)
            .with_authorize_param("code_challenge_method", "S256")
    }

    /// Mark session cookies `Secure`.
    #[must_use]
    pub const fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// Set the public base URL used in metadata documents.
    #[must_use]
    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Check the configuration invariants.
    pub fn validate(&self) -> AuthResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::InvalidConfig("client id must not be empty".to_string()));
        }
        if self.url.is_empty() {
            return Err(AuthError::InvalidConfig("Authentik URL must not be empty".to_string()));
        }
        Ok(())
    }

    /// Whether group membership is enforced.
    #[must_use]
    pub fn enforces_groups(&self) -> bool {
        !self.allowed_groups.is_empty()
    }

    /// Issuer URL of the configured application.
    #[must_use]
    pub fn issuer(&self) -> String {
        paths::issuer(&self.url, &self.application_slug)
    }

    /// URL of the OpenID configuration document.
    #[must_use]
    pub fn discovery_url(&self) -> String {
        paths::openid_configuration(&self.url, &self.application_slug)
    }
}

impl std::fmt::Debug for AuthentikConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthentikConfig")
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .field("scopes", &self.scopes)
            .field("application_slug", &self.application_slug)
            .field("allowed_groups", &self.allowed_groups)
            .finish()
    }
}

/// MCP server identity.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name reported in `initialize`.
    pub name: String,

    /// Server version reported in `initialize`.
    pub version: String,
}

impl ServerConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { name: name.into(), version: version.into() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
