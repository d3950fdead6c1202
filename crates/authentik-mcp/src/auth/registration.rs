//! Dynamic client registration (RFC 7591).
//!
//! Authentik has no anonymous registration endpoint. One well-known client,
//! Claude.ai, is answered with the pre-provisioned application this adapter is
//! configured for. Any other client needs the management API, which is not
//! wired up yet.

use std::sync::Arc;

use super::types::{ClientRegistrationRequest, ClientRegistrationResponse};
use crate::config::AuthentikConfig;
use crate::error::{AuthError, AuthResult};

/// Client name that receives the pre-provisioned client.
pub const PRECONFIGURED_CLIENT_NAME: &str = "claudeai";

/// Serves registration requests.
#[derive(Debug, Clone)]
pub struct RegistrationHandler {
    config: Arc<AuthentikConfig>,
}

impl RegistrationHandler {
    #[must_use]
    pub fn new(config: Arc<AuthentikConfig>) -> Self {
        Self { config }
    }

    /// Handle a registration request. Never touches the network.
    pub fn register(
        &self,
        request: &ClientRegistrationRequest,
    ) -> AuthResult<ClientRegistrationResponse> {
        if request.client_name.as_deref() == Some(PRECONFIGURED_CLIENT_NAME) {
            tracing::info!("Returning pre-configured client for Claude.ai");
            return Ok(self.preconfigured(request));
        }

        if self.config.registration_api_token.is_none() {
            return Err(AuthError::RegistrationNotConfigured);
        }

        // TODO: create the provider through Authentik's /api/v3/providers/oauth2/ using the registration token
        Err(AuthError::NotImplemented(format!(
            "dynamic registration for client {:?}",
            request.client_name.as_deref().unwrap_or("<unnamed>")
        )))
    }

    fn preconfigured(&self, request: &ClientRegistrationRequest) -> ClientRegistrationResponse {
        let client_id = self.config.client_id.clone();
        let registration_client_uri = request
            .redirect_uris
            .first()
            .map(|uri| format!("{uri}/register/{client_id}"));

        ClientRegistrationResponse {
            client_secret: String::new(),
            registration_access_token: "not-used".to_string(),
            registration_client_uri,
            client_id_issued_at: chrono::Utc::now().timestamp(),
            client_secret_expires_at: 0,
            redirect_uris: request.redirect_uris.clone(),
            token_endpoint_auth_method: "client_secret_post".to_string(),
            grant_types: vec!["authorization_code".to_string(), "refresh_token".to_string()],
            response_types: vec!["code".to_string()],
            scope: "openid profile email".to_string(),
            client_id,
        }
    }
}
