//! Integration tests for the login flow and metadata routes.
//!
//! Tests the full lifecycle: login → callback → session → logout.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authentik_mcp::auth::routes::auth_router;
use authentik_mcp::auth::{MemorySessionStore, SessionStore};
use authentik_mcp::{AuthentikConfig, AuthentikProvider, Identity, OAuthProvider};

const PUBLIC_URL: &str = "https://mcp.example.com";

/// Session store that counts purge passes.
#[derive(Default)]
struct CountingStore {
    inner: MemorySessionStore,
    purges: AtomicUsize,
}

#[async_trait]
impl SessionStore for CountingStore {
    async fn create(&self, identity: Identity) -> String {
        self.inner.create(identity).await
    }

    async fn get(&self, session_id: &str) -> Option<Identity> {
        self.inner.get(session_id).await
    }

    async fn remove(&self, session_id: &str) -> bool {
        self.inner.remove(session_id).await
    }

    async fn insert_login_state(&self, state: String) {
        self.inner.insert_login_state(state).await;
    }

    async fn take_login_state(&self, state: &str) -> bool {
        self.inner.take_login_state(state).await
    }

    async fn purge_expired(&self) {
        self.purges.fetch_add(1, Ordering::SeqCst);
    }
}

async fn mount_authentik(server: &MockServer, userinfo: Value) {
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/application/o/test-app/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": format!("{base}/application/o/test-app/"),
            "authorization_endpoint": format!("{base}/application/o/authorize/"),
            "token_endpoint": format!("{base}/application/o/token/"),
            "userinfo_endpoint": format!("{base}/application/o/userinfo/"),
            "revocation_endpoint": format!("{base}/application/o/revoke/")
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/application/o/token/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 300
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/application/o/userinfo/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(userinfo))
        .mount(server)
        .await;
}

fn config(server: &MockServer) -> AuthentikConfig {
    AuthentikConfig::for_testing(&server.uri()).with_public_base_url(PUBLIC_URL)
}

async fn initialized_router(config: AuthentikConfig) -> Router {
    let provider = Arc::new(AuthentikProvider::new(config).unwrap());
    provider.initialize().await.unwrap();
    auth_router(provider)
}

async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn location(response: &Response<Body>) -> String {
    response.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string()
}

/// Run login then callback; returns the callback response.
async fn login(app: &Router) -> Response<Body> {
    let response = app
        .clone()
        .oneshot(Request::get("/auth/login").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    let authorize = url::Url::parse(&location(&response)).unwrap();
    let state = authorize
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    app.clone()
        .oneshot(
            Request::get(format!("/auth/callback?code=abc&state={state}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

// ─── Initialization ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_before_initialize_is_503() {
    let server = MockServer::start().await;
    let provider = Arc::new(AuthentikProvider::new(config(&server)).unwrap());
    let app = auth_router(provider);

    for uri in ["/auth/login", "/auth/callback?code=x&state=y"] {
        let response =
            app.clone().oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await, json!({ "error": "Auth system initializing" }));
    }
}

#[tokio::test]
async fn test_login_recovers_after_failed_startup_discovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/application/o/test-app/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_authentik(&server, json!({})).await;

    let provider = Arc::new(AuthentikProvider::new(config(&server)).unwrap());
    assert!(provider.initialize().await.is_err());
    let app = auth_router(Arc::clone(&provider));

    let response =
        app.oneshot(Request::get("/auth/login").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(provider.is_initialized());
}

#[tokio::test]
async fn test_setup_routes_starts_one_cleanup_loop() {
    let server = MockServer::start().await;
    mount_authentik(&server, json!({})).await;

    let store = Arc::new(CountingStore::default());
    let provider = Arc::new(
        AuthentikProvider::new(config(&server))
            .unwrap()
            .with_session_store(Arc::clone(&store) as Arc<dyn SessionStore>),
    );

    let _first = Arc::clone(&provider).setup_routes(Router::new());
    let _second = Arc::clone(&provider).setup_routes(Router::new());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(store.purges.load(Ordering::SeqCst), 1);
}

// ─── Login flow ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_redirects_to_authentik() {
    let server = MockServer::start().await;
    mount_authentik(&server, json!({})).await;
    let app = initialized_router(config(&server)).await;

    let response =
        app.oneshot(Request::get("/auth/login").body(Body::empty()).unwrap()).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let target = location(&response);
    assert!(target.starts_with(&format!("{}/application/o/authorize/?", server.uri())));
    assert!(target.contains("client_id=test-client"));
    assert!(target.contains("state="));
}

#[tokio::test]
async fn test_full_session_lifecycle() {
    let server = MockServer::start().await;
    mount_authentik(
        &server,
        json!({ "sub": "u-1", "preferred_username": "alice", "groups": ["admins"] }),
    )
    .await;
    let app = initialized_router(config(&server)).await;

    let callback = login(&app).await;
    assert_eq!(callback.status(), StatusCode::FOUND);
    assert_eq!(location(&callback), "/");

    let set_cookie = callback.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Max-Age=86400"));
    assert!(!set_cookie.contains("Secure"));
    let cookie = set_cookie.split(';').next().unwrap().to_string();
    assert!(cookie.starts_with("authentik_session="));

    let user = app
        .clone()
        .oneshot(
            Request::get("/auth/user").header(header::COOKIE, &cookie).body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(user.status(), StatusCode::OK);
    let json = body_json(user).await;
    assert_eq!(json["user"]["username"], "alice");
    assert_eq!(json["user"]["groups"], json!(["admins"]));

    let logout = app
        .clone()
        .oneshot(
            Request::post("/auth/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(logout.status(), StatusCode::OK);
    assert!(
        logout.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap().contains("Max-Age=0")
    );
    assert_eq!(body_json(logout).await, json!({ "success": true }));

    let after = app
        .oneshot(
            Request::get("/auth/user").header(header::COOKIE, &cookie).body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_secure_cookie_flag() {
    let server = MockServer::start().await;
    mount_authentik(&server, json!({ "sub": "u-1", "preferred_username": "alice" })).await;
    let app = initialized_router(config(&server).with_secure_cookies(true)).await;

    let callback = login(&app).await;
    let set_cookie = callback.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.ends_with("; Secure"));
}

#[tokio::test]
async fn test_callback_with_unknown_state() {
    let server = MockServer::start().await;
    mount_authentik(&server, json!({ "sub": "u-1", "preferred_username": "alice" })).await;
    let app = initialized_router(config(&server)).await;

    let response = app
        .oneshot(Request::get("/auth/callback?code=abc&state=forged").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/auth/error");
}

#[tokio::test]
async fn test_callback_denied_by_provider() {
    let server = MockServer::start().await;
    mount_authentik(&server, json!({})).await;
    let app = initialized_router(config(&server)).await;

    let response = app
        .oneshot(
            Request::get("/auth/callback?error=access_denied&error_description=nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(location(&response), "/auth/error");
}

#[tokio::test]
async fn test_callback_outside_allowed_groups() {
    let server = MockServer::start().await;
    mount_authentik(
        &server,
        json!({ "sub": "u-2", "preferred_username": "bob", "groups": ["users"] }),
    )
    .await;
    let app = initialized_router(config(&server).with_allowed_groups(["admins"])).await;

    let callback = login(&app).await;
    assert_eq!(location(&callback), "/auth/error");
    assert!(callback.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_callback_with_incomplete_profile() {
    let server = MockServer::start().await;
    mount_authentik(&server, json!({ "locale": "en" })).await;
    let app = initialized_router(config(&server)).await;

    let callback = login(&app).await;
    assert_eq!(location(&callback), "/auth/error");
}

#[tokio::test]
async fn test_error_page() {
    let server = MockServer::start().await;
    let provider = Arc::new(AuthentikProvider::new(config(&server)).unwrap());

    let response = auth_router(provider)
        .oneshot(Request::get("/auth/error").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({
            "error": "Authentication failed",
            "message": "Please check your credentials and try again"
        })
    );
}

#[tokio::test]
async fn test_user_without_session() {
    let server = MockServer::start().await;
    let provider = Arc::new(AuthentikProvider::new(config(&server)).unwrap());

    let response = auth_router(provider)
        .oneshot(
            Request::get("/auth/user")
                .header(header::COOKIE, "authentik_session=unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ─── Metadata ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_authorization_server_metadata() {
    let server = MockServer::start().await;
    let provider = Arc::new(AuthentikProvider::new(config(&server)).unwrap());

    let response = auth_router(provider)
        .oneshot(
            Request::get("/.well-known/oauth-authorization-server").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let base = server.uri();
    assert_eq!(json["issuer"], format!("{base}/application/o/test-app/"));
    assert_eq!(json["token_endpoint"], format!("{base}/application/o/token/"));
    assert_eq!(json["registration_endpoint"], format!("{PUBLIC_URL}/application/o/register/"));
    assert_eq!(json["grant_types_supported"], json!(["authorization_code", "refresh_token"]));
}

#[tokio::test]
async fn test_protected_resource_metadata() {
    let server = MockServer::start().await;
    let provider = Arc::new(AuthentikProvider::new(config(&server)).unwrap());

    let response = auth_router(provider)
        .oneshot(Request::get("/.well-known/oauth-protected-resource").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["resource"], PUBLIC_URL);
    assert_eq!(
        json["authorization_servers"],
        json!([format!("{}/application/o/test-app/", server.uri())])
    );
}

// ─── Dynamic Client Registration ─────────────────────────────────────────────

async fn register(app: Router, body: Value) -> Response<Body> {
    app.oneshot(
        Request::post("/application/o/register/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_register_preconfigured_client() {
    let server = MockServer::start().await;
    let provider = Arc::new(AuthentikProvider::new(config(&server)).unwrap());

    let response = register(
        auth_router(provider),
        json!({ "client_name": "claudeai", "redirect_uris": ["https://claude.ai/api/mcp/auth_callback"] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["client_id"], "test-client");
    assert_eq!(json["client_secret"], "");
    assert_eq!(json["client_secret_expires_at"], 0);
    assert_eq!(
        json["registration_client_uri"],
        "https://claude.ai/api/mcp/auth_callback/register/test-client"
    );
}

#[tokio::test]
async fn test_register_other_client_fails() {
    let server = MockServer::start().await;
    let provider = Arc::new(AuthentikProvider::new(config(&server)).unwrap());

    let response =
        register(auth_router(provider), json!({ "client_name": "cursor", "redirect_uris": [] }))
            .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["error"],
        "Dynamic registration requires API token configuration"
    );
}
