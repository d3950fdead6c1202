//! Authorization URL builder.

use url::Url;

use crate::config::AuthentikConfig;
use crate::error::{AuthError, AuthResult};

/// Build the URL that starts the authorization code flow.
///
/// Pure: identical inputs always produce identical URLs. `redirect_uri`
/// overrides the configured default; with neither present an empty value is
/// sent. Extra parameters from the configuration are appended last.
pub fn build_authorization_url(
    authorization_endpoint: &str,
    config: &AuthentikConfig,
    state: Option<&str>,
    redirect_uri: Option<&str>,
) -> AuthResult<Url> {
    let mut url = Url::parse(authorization_endpoint)
        .map_err(|e| AuthError::discovery(format!("invalid authorization endpoint: {e}")))?;

    let redirect_uri = redirect_uri.or(config.redirect_uri.as_deref()).unwrap_or_default();

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &config.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", &config.scopes.join(" "))
            .append_pair("redirect_uri", redirect_uri);

        if let Some(state) = state {
            query.append_pair("state", state);
        }

        for (key, value) in &config.extra_authorize_params {
            query.append_pair(key, value);
        }
    }

    Ok(url)
}
