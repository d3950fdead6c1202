//! HTTP routes for the interactive login flow and OAuth metadata.
//!
//! | Method | Path                                      |
//! |--------|-------------------------------------------|
//! | GET    | `/auth/login`                             |
//! | GET    | `/auth/callback`                          |
//! | POST   | `/auth/logout`                            |
//! | GET    | `/auth/user`                              |
//! | GET    | `/auth/error`                             |
//! | GET    | `/.well-known/oauth-authorization-server` |
//! | GET    | `/.well-known/oauth-protected-resource`   |
//! | POST   | `/application/o/register/`                |

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;

use super::OAuthProvider;
use super::provider::AuthentikProvider;
use super::session::{SESSION_COOKIE, SESSION_LIFETIME, session_id};
use super::types::ClientRegistrationRequest;
use crate::error::AuthError;

pub const LOGIN_PATH: &str = "/auth/login";
pub const CALLBACK_PATH: &str = "/auth/callback";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const USER_PATH: &str = "/auth/user";
pub const ERROR_PATH: &str = "/auth/error";
pub const AUTHORIZATION_SERVER_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";
pub const PROTECTED_RESOURCE_METADATA_PATH: &str = "/.well-known/oauth-protected-resource";
pub const REGISTER_PATH: &str = "/application/o/register/";

type ProviderState = State<Arc<AuthentikProvider>>;

/// Build the provider's router. Does not trigger initialization.
pub fn auth_router(provider: Arc<AuthentikProvider>) -> Router {
    Router::new()
        .route(LOGIN_PATH, get(handle_login))
        .route(CALLBACK_PATH, get(handle_callback))
        .route(LOGOUT_PATH, post(handle_logout))
        .route(USER_PATH, get(handle_user))
        .route(ERROR_PATH, get(handle_error))
        .route(AUTHORIZATION_SERVER_METADATA_PATH, get(handle_auth_server_metadata))
        .route(PROTECTED_RESOURCE_METADATA_PATH, get(handle_protected_resource))
        .route(REGISTER_PATH, post(handle_register))
        .with_state(provider)
}

fn error_response(error: &AuthError) -> Response {
    (error.status_code(), Json(serde_json::json!({ "error": error.public_message() })))
        .into_response()
}

fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_owned())]).into_response()
}

fn session_cookie(value: &str, max_age: u64, secure: bool) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

// ─── Login flow ──────────────────────────────────────────────────────────────

/// Retry initialization on demand. Yields the 503 response while Authentik
/// stays unreachable.
async fn not_ready(provider: &AuthentikProvider) -> Option<Response> {
    if provider.is_initialized() {
        return None;
    }
    let e = provider.initialize().await.err()?;
    tracing::warn!(error = %e, "Authentik not ready");
    Some(error_response(&AuthError::NotInitialized))
}

/// `GET /auth/login`
///
/// Redirect to Authentik's authorization endpoint with a fresh `state`.
async fn handle_login(State(provider): ProviderState) -> Response {
    if let Some(response) = not_ready(&provider).await {
        return response;
    }

    let state = uuid::Uuid::new_v4().simple().to_string();
    provider.sessions().insert_login_state(state.clone()).await;

    match provider.get_auth_url(Some(&state), None).await {
        Ok(url) => redirect(&url),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build authorization URL");
            error_response(&e)
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// `GET /auth/callback`
///
/// Complete the login, open a session and redirect to `/`. Any failure
/// redirects to the error page.
async fn handle_callback(
    State(provider): ProviderState,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(response) = not_ready(&provider).await {
        return response;
    }

    if let Some(error) = query.error.as_deref() {
        tracing::warn!(
            error,
            description = query.error_description.as_deref().unwrap_or_default(),
            "Authorization denied by Authentik"
        );
        return redirect(ERROR_PATH);
    }

    let Some(code) = query.code.as_deref() else {
        tracing::warn!("Callback without authorization code");
        return redirect(ERROR_PATH);
    };

    let state_ok = match query.state.as_deref() {
        Some(state) => provider.sessions().take_login_state(state).await,
        None => false,
    };
    if !state_ok {
        tracing::warn!("Callback with unknown or expired state");
        return redirect(ERROR_PATH);
    }

    let identity = match provider.complete_login(code, query.state.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "Login failed");
            return redirect(ERROR_PATH);
        }
    };

    tracing::info!(user = %identity.username, "User logged in");
    let id = provider.sessions().create(identity).await;
    let cookie = session_cookie(
        &id,
        SESSION_LIFETIME.as_secs(),
        provider.config().secure_cookies,
    );

    (StatusCode::FOUND, [(header::LOCATION, "/".to_owned()), (header::SET_COOKIE, cookie)])
        .into_response()
}

/// `POST /auth/logout`
async fn handle_logout(State(provider): ProviderState, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        if provider.sessions().remove(&id).await {
            tracing::info!("User logged out");
        }
    }

    let cleared = session_cookie("", 0, provider.config().secure_cookies);
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cleared)],
        Json(serde_json::json!({ "success": true })),
    )
        .into_response()
}

/// `GET /auth/user`
///
/// The identity behind the session cookie.
async fn handle_user(State(provider): ProviderState, headers: HeaderMap) -> Response {
    match provider.session_identity(&headers).await {
        Some(user) => Json(serde_json::json!({ "user": user })).into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Not authenticated" })),
        )
            .into_response(),
    }
}

/// `GET /auth/error`
async fn handle_error() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication failed",
            "message": "Please check your credentials and try again",
        })),
    )
        .into_response()
}

// ─── Metadata ────────────────────────────────────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
async fn handle_auth_server_metadata(State(provider): ProviderState) -> impl IntoResponse {
    Json(provider.discovery_metadata(&provider.base_url()))
}

/// `GET /.well-known/oauth-protected-resource`
async fn handle_protected_resource(State(provider): ProviderState) -> impl IntoResponse {
    Json(provider.protected_resource_metadata(&provider.base_url()))
}

// ─── RFC 7591: Dynamic Client Registration ───────────────────────────────────

/// `POST /application/o/register/`
async fn handle_register(
    State(provider): ProviderState,
    Json(request): Json<ClientRegistrationRequest>,
) -> Response {
    match provider.register_client(&request).await {
        Ok(client) => {
            tracing::info!(client_id = %client.client_id, "Registered OAuth client");
            (StatusCode::CREATED, Json(client)).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Client registration failed");
            error_response(&e)
        }
    }
}
