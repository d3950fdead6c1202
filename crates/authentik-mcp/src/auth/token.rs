//! Token exchanger: authorization code and refresh grants, plus revocation.
//!
//! All requests are form-encoded POSTs. The client secret is only sent when
//! one is configured, so public clients work unchanged. Nothing is cached.

use std::sync::Arc;

use serde::Deserialize;

use super::types::{TokenResult, TokenTypeHint};
use crate::client::HttpClient;
use crate::config::AuthentikConfig;
use crate::error::{AuthError, AuthResult};

/// Raw token endpoint response. Every field is optional so that a missing
/// `access_token` is reported as an exchange failure, not a parse error.
#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
}

/// Exchanges codes and refresh tokens at the provider's token endpoint.
#[derive(Clone)]
pub struct TokenExchanger {
    http: Arc<dyn HttpClient>,
    config: Arc<AuthentikConfig>,
}

impl TokenExchanger {
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>, config: Arc<AuthentikConfig>) -> Self {
        Self { http, config }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// `state` is accepted for interface symmetry; it was already checked by
    /// whoever received the callback.
    pub async fn exchange_code(
        &self,
        token_endpoint: &str,
        code: &str,
        _state: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> AuthResult<TokenResult> {
        let redirect_uri = redirect_uri
            .or(self.config.redirect_uri.as_deref())
            .unwrap_or_default()
            .to_string();

        let form = self.with_client_credentials(vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri),
        ]);

        self.request_tokens(token_endpoint, &form, "exchange code for tokens").await
    }

    /// Obtain a fresh access token from a refresh token.
    pub async fn refresh(&self, token_endpoint: &str, refresh_token: &str) -> AuthResult<TokenResult> {
        let form = self.with_client_credentials(vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ]);

        self.request_tokens(token_endpoint, &form, "refresh token").await
    }

    /// Revoke a token. Best effort: failures are logged and swallowed.
    pub async fn revoke(&self, revocation_endpoint: &str, token: &str, hint: TokenTypeHint) {
        let form = self.with_client_credentials(vec![
            ("token", token.to_string()),
            ("token_type_hint", hint.as_str().to_string()),
        ]);

        match self.http.post_form(revocation_endpoint, &form).await {
            Ok(response) if response.is_success() => {
                tracing::debug!(hint = hint.as_str(), "Token revoked");
            }
            Ok(response) => {
                tracing::warn!(status = response.status, "Failed to revoke token");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to revoke token");
            }
        }
    }

    fn with_client_credentials(
        &self,
        mut form: Vec<(&'static str, String)>,
    ) -> Vec<(&'static str, String)> {
        form.push(("client_id", self.config.client_id.clone()));
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        form
    }

    async fn request_tokens(
        &self,
        token_endpoint: &str,
        form: &[(&str, String)],
        action: &'static str,
    ) -> AuthResult<TokenResult> {
        let response = self.http.post_form(token_endpoint, form).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to {action}");
            AuthError::token_exchange(e.to_string())
        })?;

        if !response.is_success() {
            let reason = response
                .body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown_error")
                .to_string();
            tracing::error!(status = response.status, error = %reason, "Failed to {action}");
            return Err(AuthError::token_exchange(format!(
                "token endpoint returned {}: {reason}",
                response.status
            )));
        }

        let raw: RawTokenResponse = serde_json::from_value(response.body)
            .map_err(|e| AuthError::token_exchange(format!("malformed token response: {e}")))?;

        let access_token = raw
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::token_exchange("response is missing access_token"))?;

        Ok(TokenResult {
            access_token,
            refresh_token: raw.refresh_token,
            token_type: raw.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in: raw.expires_in,
            scope: raw.scope,
        })
    }
}

impl std::fmt::Debug for TokenExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchanger").field("client_id", &self.config.client_id).finish()
    }
}
