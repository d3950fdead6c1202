//! MCP tool registration types.

use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ToolResult;

/// Key/value context passed to every handler.
///
/// Holds the server-wide context plus per-request entries such as the
/// authenticated `user`.
pub type ToolContext = Map<String, Value>;

/// Tool metadata advertised in `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    /// JSON Schema for the tool arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolConfig {
    /// Tool taking no arguments.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            title: None,
            description: description.into(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Names listed under the schema's `required` key.
    #[must_use]
    pub fn required_arguments(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Executes a tool call.
///
/// Implemented for any `Fn(ToolContext, Value) -> impl Future<Output = ToolResult<String>>`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool. The returned string becomes the text content of the result.
    async fn call(&self, ctx: &ToolContext, input: Value) -> ToolResult<String>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(ToolContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult<String>> + Send,
{
    async fn call(&self, ctx: &ToolContext, input: Value) -> ToolResult<String> {
        (self)(ctx.clone(), input).await
    }
}
