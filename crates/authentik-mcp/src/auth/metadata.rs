//! OAuth metadata documents.
//!
//! - RFC 8414: Authorization Server Metadata
//! - RFC 9728: Protected Resource Metadata
//!
//! Endpoint URLs are templated from the configuration; everything else is a
//! fixed literal.

use serde::{Deserialize, Serialize};

use crate::config::{AuthentikConfig, paths};

/// Authorization server metadata served at
/// `/.well-known/oauth-authorization-server`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthDiscovery {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

/// Protected resource metadata served at
/// `/.well-known/oauth-protected-resource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Build the authorization server metadata for `base_url`.
#[must_use]
pub fn discovery_metadata(
    config: &AuthentikConfig,
    base_url: &str,
    supports_registration: bool,
) -> OAuthDiscovery {
    let url = &config.url;
    let slug = &config.application_slug;
    let base_url = base_url.trim_end_matches('/');

    OAuthDiscovery {
        issuer: paths::issuer(url, slug),
        authorization_endpoint: paths::endpoint(url, "authorize"),
        token_endpoint: paths::endpoint(url, "token"),
        userinfo_endpoint: paths::endpoint(url, "userinfo"),
        jwks_uri: paths::jwks(url, slug),
        registration_endpoint: supports_registration
            .then(|| format!("{base_url}{}/register/", paths::OAUTH_PREFIX)),
        scopes_supported: strings(&["openid", "profile", "email"]),
        response_types_supported: strings(&["code"]),
        grant_types_supported: strings(&["authorization_code", "refresh_token"]),
        subject_types_supported: strings(&["public"]),
        id_token_signing_alg_values_supported: strings(&["RS256"]),
        token_endpoint_auth_methods_supported: strings(&[
            "client_secret_basic",
            "client_secret_post",
            "none",
        ]),
        code_challenge_methods_supported: strings(&["S256", "plain"]),
    }
}

/// Build the protected resource metadata for `base_url`.
#[must_use]
pub fn protected_resource_metadata(
    config: &AuthentikConfig,
    base_url: &str,
) -> ProtectedResourceMetadata {
    ProtectedResourceMetadata {
        resource: base_url.to_string(),
        authorization_servers: vec![config.issuer()],
    }
}
