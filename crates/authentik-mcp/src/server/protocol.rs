//! JSON-RPC 2.0 types and MCP method dispatch.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::McpHandle;
use super::tool::ToolContext;

/// Protocol version answered when the client does not send one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), method: method.into(), params, id: Some(id.into()) }
    }

    /// A request without an id. Never answered.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), method: method.into(), params, id: None }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }
}

impl JsonRpcResponse {
    const VERSION: &'static str = "2.0";

    #[must_use]
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: Cow::Borrowed(Self::VERSION), result: Some(result), error: None, id }
    }

    #[must_use]
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self::failure(id, JsonRpcError::new(code, message))
    }

    #[must_use]
    pub fn failure(id: Option<Value>, error: JsonRpcError) -> Self {
        Self { jsonrpc: Cow::Borrowed(Self::VERSION), result: None, error: Some(error), id }
    }
}

type RpcResult = Result<Value, JsonRpcError>;

/// A `*/list` entry: the registered name followed by the config fields.
fn listing<T: Serialize>(name: &str, config: &T) -> Value {
    let mut entry = Map::new();
    entry.insert("name".into(), Value::from(name));
    if let Ok(Value::Object(fields)) = serde_json::to_value(config) {
        entry.extend(fields);
    }
    Value::Object(entry)
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, JsonRpcError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcError::invalid_params(format!("Missing '{key}' parameter")))
}

fn object_param(params: &Value, key: &str) -> Result<Map<String, Value>, JsonRpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(JsonRpcError::invalid_params(format!("'{key}' must be an object"))),
    }
}

fn check_required<'a>(
    required: impl IntoIterator<Item = &'a str>,
    arguments: &Map<String, Value>,
) -> Result<(), JsonRpcError> {
    for name in required {
        if arguments.get(name).is_none_or(Value::is_null) {
            return Err(JsonRpcError::invalid_params(format!(
                "Missing required argument: {name}"
            )));
        }
    }
    Ok(())
}

impl McpHandle {
    /// Handle one request. Notifications yield `None`.
    ///
    /// `extra` is merged over the server context for this request only.
    pub async fn dispatch(
        &self,
        request: JsonRpcRequest,
        extra: ToolContext,
    ) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            tracing::debug!(method = %request.method, "Received notification");
            return None;
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                Some(id),
                INVALID_REQUEST,
                "Invalid JSON-RPC version",
            ));
        }

        tracing::debug!(method = %request.method, "Dispatching request");

        let mut ctx = self.context();
        ctx.extend(extra);

        let params = &request.params;
        let result = match request.method.as_str() {
            "initialize" => Ok(self.initialize(params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list()),
            "tools/call" => self.tools_call(params, &ctx).await,
            "resources/list" => Ok(self.resources_list()),
            "resources/read" => self.resources_read(params, &ctx).await,
            "prompts/list" => Ok(self.prompts_list()),
            "prompts/get" => self.prompts_get(params, &ctx).await,
            other => Err(JsonRpcError::new(METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(Some(id), value),
            Err(error) => JsonRpcResponse::failure(Some(id), error),
        })
    }

    fn initialize(&self, params: &Value) -> Value {
        let protocol_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);

        tracing::info!(protocol_version, "MCP initialize");

        let config = &self.state.config;
        json!({
            "protocolVersion": protocol_version,
            "capabilities": {
                "tools": {},
                "resources": {},
                "prompts": {}
            },
            "serverInfo": {
                "name": config.name,
                "version": config.version
            }
        })
    }

    fn tools_list(&self) -> Value {
        let tools: Vec<Value> = self
            .state
            .tools()
            .iter()
            .map(|(name, tool)| listing(name, &tool.config))
            .collect();
        json!({ "tools": tools })
    }

    async fn tools_call(&self, params: &Value, ctx: &ToolContext) -> RpcResult {
        let name = str_param(params, "name")?;
        let arguments = object_param(params, "arguments")?;

        let Some(tool) = self.state.tools().get(name).cloned() else {
            return Err(JsonRpcError::invalid_params(format!("Unknown tool: {name}")));
        };

        check_required(tool.config.required_arguments(), &arguments)?;

        tracing::info!(tool = %name, "Executing tool");

        match tool.handler.call(ctx, Value::Object(arguments)).await {
            Ok(text) => Ok(json!({ "content": [{ "type": "text", "text": text }] })),
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool execution failed");
                Ok(json!({
                    "content": [{ "type": "text", "text": e.to_user_message() }],
                    "isError": true
                }))
            }
        }
    }

    fn resources_list(&self) -> Value {
        let resources: Vec<Value> = self
            .state
            .resources()
            .iter()
            .map(|(name, resource)| listing(name, &resource.config))
            .collect();
        json!({ "resources": resources })
    }

    async fn resources_read(&self, params: &Value, ctx: &ToolContext) -> RpcResult {
        let uri = str_param(params, "uri")?;

        let resource = self
            .state
            .resources()
            .values()
            .find(|r| r.config.uri == uri)
            .cloned()
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown resource: {uri}")))?;

        let text = resource.handler.read(ctx, uri).await.map_err(|e| {
            tracing::warn!(uri, error = %e, "Resource read failed");
            JsonRpcError::new(INTERNAL_ERROR, e.to_user_message())
        })?;

        let mut content = json!({ "uri": uri, "text": text });
        if let (Some(obj), Some(mime)) = (content.as_object_mut(), &resource.config.mime_type) {
            obj.insert("mimeType".into(), Value::from(mime.as_str()));
        }
        Ok(json!({ "contents": [content] }))
    }

    fn prompts_list(&self) -> Value {
        let prompts: Vec<Value> = self
            .state
            .prompts()
            .iter()
            .map(|(name, prompt)| listing(name, &prompt.config))
            .collect();
        json!({ "prompts": prompts })
    }

    async fn prompts_get(&self, params: &Value, ctx: &ToolContext) -> RpcResult {
        let name = str_param(params, "name")?;
        let arguments = object_param(params, "arguments")?;

        let Some(prompt) = self.state.prompts().get(name).cloned() else {
            return Err(JsonRpcError::invalid_params(format!("Unknown prompt: {name}")));
        };

        let required = prompt
            .config
            .arguments
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name.as_str());
        check_required(required, &arguments)?;

        let messages = prompt.handler.get(ctx, arguments).await.map_err(|e| {
            tracing::warn!(prompt = %name, error = %e, "Prompt rendering failed");
            JsonRpcError::new(INTERNAL_ERROR, e.to_user_message())
        })?;

        let mut result = json!({ "messages": messages });
        if let (Some(obj), Some(description)) =
            (result.as_object_mut(), &prompt.config.description)
        {
            obj.insert("description".into(), Value::from(description.as_str()));
        }
        Ok(result)
    }
}
