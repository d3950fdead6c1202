//! MCP server lifecycle, protocol dispatch and transport tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Map, Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authentik_mcp::error::{ServerResult, ToolError, ToolResult};
use authentik_mcp::server::protocol::{
    INVALID_PARAMS, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND,
};
use authentik_mcp::server::transport::stdio::serve_lines;
use authentik_mcp::server::{
    HttpTransport, McpHandle, PromptArgument, PromptConfig, PromptMessage, ResourceConfig,
    ToolConfig, ToolContext, Transport,
};
use authentik_mcp::{AuthentikConfig, AuthentikProvider, McpServer, ServerConfig};

/// Transport that only counts lifecycle calls.
#[derive(Default)]
struct CountingTransport {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for CountingTransport {
    fn name(&self) -> &str {
        "counting"
    }

    async fn start(&mut self, _handle: McpHandle) -> ServerResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> ServerResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn whoami(ctx: ToolContext, _input: Value) -> ToolResult<String> {
    Ok(ctx.get("user").map(|u| u["username"].to_string()).unwrap_or_default())
}

async fn echo(_ctx: ToolContext, input: Value) -> ToolResult<String> {
    Ok(input["message"].as_str().unwrap_or_default().to_string())
}

async fn fail(_ctx: ToolContext, _input: Value) -> ToolResult<String> {
    Err(ToolError::not_found("widget 42"))
}

fn test_server() -> McpServer {
    let server = McpServer::new(ServerConfig::new("test-server", "1.2.3"));
    server.register_tool("whoami", ToolConfig::new("Current user"), whoami).unwrap();
    server
        .register_tool(
            "echo",
            ToolConfig::new("Echo").with_input_schema(json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            })),
            echo,
        )
        .unwrap();
    server.register_tool("fail", ToolConfig::new("Always fails"), fail).unwrap();
    server
        .register_resource(
            "readme",
            ResourceConfig::new("docs://readme").with_mime_type("text/markdown"),
            |_ctx: ToolContext, uri: String| async move { Ok::<_, ToolError>(format!("# {uri}")) },
        )
        .unwrap();
    server
        .register_prompt(
            "greet",
            PromptConfig::new("Greeting").with_argument(PromptArgument::required("name")),
            |_ctx: ToolContext, args: Map<String, Value>| async move {
                let name = args["name"].as_str().unwrap_or_default().to_string();
                Ok::<_, ToolError>(vec![PromptMessage::user(format!("Say hello to {name}"))])
            },
        )
        .unwrap();
    server
}

async fn call(handle: &McpHandle, method: &str, params: Value) -> JsonRpcResponse {
    handle.dispatch(JsonRpcRequest::new(1, method, params), ToolContext::new()).await.unwrap()
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_start_without_transports() {
    let mut server = McpServer::new(ServerConfig::default());
    assert!(!server.is_started());

    let err = server.start().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "No transports configured. Use use_transport() to add transports."
    );
    assert!(!server.is_started());
}

#[tokio::test]
async fn test_lifecycle_with_transport() {
    let transport = CountingTransport::default();
    let starts = Arc::clone(&transport.starts);
    let stops = Arc::clone(&transport.stops);

    let mut server = McpServer::new(ServerConfig::default());
    server.use_transport(transport).unwrap();
    server.start().await.unwrap();
    assert!(server.is_started());
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    let err = server.use_transport(CountingTransport::default()).unwrap_err();
    assert_eq!(err.to_string(), "Cannot add transport after server has started");
    assert!(server.start().await.is_err());

    server.stop().await.unwrap();
    assert!(!server.is_started());
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert!(server.stop().await.is_err());
}

#[test]
fn test_registries_listed() {
    let server = test_server();
    let tools: Vec<String> = server.list_tools().into_iter().map(|(name, _)| name).collect();
    assert_eq!(tools, vec!["echo", "fail", "whoami"]);
    assert_eq!(server.list_resources().len(), 1);
    assert_eq!(server.list_prompts()[0].1.arguments[0].name, "name");
}

// =============================================================================
// Protocol
// =============================================================================

#[tokio::test]
async fn test_initialize() {
    let handle = test_server().handle();

    let response = call(&handle, "initialize", json!({ "protocolVersion": "2025-03-26" })).await;
    let result = response.result.unwrap();
    assert_eq!(result["protocolVersion"], "2025-03-26");
    assert_eq!(result["serverInfo"], json!({ "name": "test-server", "version": "1.2.3" }));
    assert!(result["capabilities"]["tools"].is_object());

    let response = call(&handle, "initialize", json!({})).await;
    assert_eq!(response.result.unwrap()["protocolVersion"], "2024-11-05");
}

#[tokio::test]
async fn test_tools_list() {
    let handle = test_server().handle();

    let result = call(&handle, "tools/list", Value::Null).await.result.unwrap();
    let echo = result["tools"].as_array().unwrap().iter().find(|t| t["name"] == "echo").unwrap();
    assert_eq!(echo["description"], "Echo");
    assert_eq!(echo["inputSchema"]["required"], json!(["message"]));
}

#[tokio::test]
async fn test_tools_call() {
    let handle = test_server().handle();

    let response =
        call(&handle, "tools/call", json!({ "name": "echo", "arguments": { "message": "hi" } }))
            .await;
    assert_eq!(response.result.unwrap()["content"][0]["text"], "hi");
}

#[tokio::test]
async fn test_tools_call_missing_required_argument() {
    let handle = test_server().handle();

    let response = call(&handle, "tools/call", json!({ "name": "echo", "arguments": {} })).await;
    let error = response.error.unwrap();
    assert_eq!(error.code, INVALID_PARAMS);
    assert!(error.message.contains("message"));
}

#[tokio::test]
async fn test_tools_call_unknown_tool() {
    let handle = test_server().handle();

    let response = call(&handle, "tools/call", json!({ "name": "nope" })).await;
    assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
}

#[tokio::test]
async fn test_tool_error_is_result() {
    let handle = test_server().handle();

    let response = call(&handle, "tools/call", json!({ "name": "fail" })).await;
    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    assert_eq!(result["content"][0]["text"], "Not found: widget 42");
}

#[tokio::test]
async fn test_unknown_method() {
    let handle = test_server().handle();

    let response = call(&handle, "sampling/createMessage", json!({})).await;
    assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_notification_has_no_response() {
    let handle = test_server().handle();

    let response = handle
        .dispatch(
            JsonRpcRequest::notification("notifications/initialized", json!({})),
            ToolContext::new(),
        )
        .await;
    assert!(response.is_none());
}

#[tokio::test]
async fn test_context_merge_and_request_extra() {
    let server = test_server();
    server.set_context_value("user", json!({ "username": "server-default" }));
    let handle = server.handle();

    let response = call(&handle, "tools/call", json!({ "name": "whoami" })).await;
    assert_eq!(response.result.unwrap()["content"][0]["text"], "\"server-default\"");

    let mut extra = ToolContext::new();
    extra.insert("user".into(), json!({ "username": "alice" }));
    let response = handle
        .dispatch(JsonRpcRequest::new(2, "tools/call", json!({ "name": "whoami" })), extra)
        .await
        .unwrap();
    assert_eq!(response.result.unwrap()["content"][0]["text"], "\"alice\"");

    // Per-request entries do not leak into the shared context.
    assert_eq!(server.context()["user"]["username"], "server-default");
}

#[tokio::test]
async fn test_resources() {
    let handle = test_server().handle();

    let list = call(&handle, "resources/list", json!({})).await.result.unwrap();
    assert_eq!(list["resources"][0]["uri"], "docs://readme");
    assert_eq!(list["resources"][0]["mimeType"], "text/markdown");

    let read = call(&handle, "resources/read", json!({ "uri": "docs://readme" })).await;
    let content = &read.result.unwrap()["contents"][0];
    assert_eq!(content["text"], "# docs://readme");
    assert_eq!(content["mimeType"], "text/markdown");

    let missing = call(&handle, "resources/read", json!({ "uri": "docs://other" })).await;
    assert_eq!(missing.error.unwrap().code, INVALID_PARAMS);
}

#[tokio::test]
async fn test_prompts() {
    let handle = test_server().handle();

    let response =
        call(&handle, "prompts/get", json!({ "name": "greet", "arguments": { "name": "Ada" } }))
            .await;
    let result = response.result.unwrap();
    assert_eq!(result["description"], "Greeting");
    assert_eq!(result["messages"][0]["role"], "user");
    assert_eq!(result["messages"][0]["content"]["text"], "Say hello to Ada");

    let missing = call(&handle, "prompts/get", json!({ "name": "greet" })).await;
    assert_eq!(missing.error.unwrap().code, INVALID_PARAMS);
}

// =============================================================================
// Stdio transport
// =============================================================================

#[tokio::test]
async fn test_stdio_line_protocol() {
    let handle = test_server().handle();
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
        "\n\n",
        "not json\n",
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"message":"yo"}}}"#,
        "\n",
    );

    let mut output = Vec::new();
    serve_lines(&handle, input.as_bytes(), &mut output).await.unwrap();

    let lines: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["id"], 1);
    assert_eq!(lines[1]["error"]["code"], -32700);
    assert!(lines[1]["id"].is_null());
    assert_eq!(lines[2]["result"]["content"][0]["text"], "yo");
}

// =============================================================================
// HTTP transport
// =============================================================================

fn mcp_request(body: &Value) -> Request<Body> {
    Request::post("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_http_without_auth() {
    let server = test_server();
    let app = HttpTransport::new(([127, 0, 0, 1], 0).into()).router(server.handle());

    let response = app
        .clone()
        .oneshot(mcp_request(&json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["result"]["tools"].as_array().unwrap().len(), 3);

    let notification = app
        .clone()
        .oneshot(mcp_request(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })))
        .await
        .unwrap();
    assert_eq!(notification.status(), StatusCode::ACCEPTED);

    let health =
        app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(body_json(health).await["service"], "test-server");
}

#[tokio::test]
async fn test_http_malformed_body_is_parse_error() {
    let app = HttpTransport::new(([127, 0, 0, 1], 0).into()).router(test_server().handle());

    let request = Request::post("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32700);
    assert!(json["id"].is_null());
}

async fn authentik_mock() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/application/o/test-app/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "authorization_endpoint": format!("{base}/application/o/authorize/"),
            "token_endpoint": format!("{base}/application/o/token/"),
            "userinfo_endpoint": format!("{base}/application/o/userinfo/")
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/application/o/userinfo/"))
        .and(wiremock::matchers::header("Authorization", "Bearer good-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "u-1",
            "preferred_username": "alice"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/application/o/userinfo/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    server
}

fn authenticated_app(authentik: &MockServer, server: &McpServer) -> axum::Router {
    let provider =
        Arc::new(AuthentikProvider::new(AuthentikConfig::for_testing(&authentik.uri())).unwrap());
    HttpTransport::new(([127, 0, 0, 1], 0).into())
        .with_base_url("https://mcp.example.com/")
        .with_provider(provider)
        .router(server.handle())
}

#[tokio::test]
async fn test_http_requires_authentication() {
    let authentik = authentik_mock().await;
    let server = test_server();
    let app = authenticated_app(&authentik, &server);

    for token in [None, Some("Bearer bad-token")] {
        let mut request = mcp_request(&json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }));
        if let Some(token) = token {
            request.headers_mut().insert(header::AUTHORIZATION, token.parse().unwrap());
        }

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer resource_metadata=\"https://mcp.example.com/.well-known/oauth-protected-resource\""
        );
    }
}

#[tokio::test]
async fn test_http_injects_user_into_context() {
    let authentik = authentik_mock().await;
    let server = test_server();
    let app = authenticated_app(&authentik, &server);

    let mut request = mcp_request(&json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools/call",
        "params": { "name": "whoami" }
    }));
    request.headers_mut().insert(header::AUTHORIZATION, "Bearer good-token".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], 7);
    assert_eq!(json["result"]["content"][0]["text"], "\"alice\"");
}

#[tokio::test]
async fn test_http_mounts_provider_routes() {
    let authentik = authentik_mock().await;
    let server = test_server();
    let app = authenticated_app(&authentik, &server);

    let response = app
        .oneshot(Request::get("/.well-known/oauth-protected-resource").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_http_transport_serves_and_stops() {
    let mut transport = HttpTransport::new(([127, 0, 0, 1], 0).into());
    transport.start(test_server().handle()).await.unwrap();
    let addr = transport.local_addr().unwrap();

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    transport.stop().await.unwrap();
    assert!(transport.local_addr().is_none());
}
