//! MCP resource registration types.

use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;

use super::tool::ToolContext;
use crate::error::ToolResult;

/// Resource metadata advertised in `resources/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ResourceConfig {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), title: None, description: None, mime_type: None }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Produces the text content of a resource.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self, ctx: &ToolContext, uri: &str) -> ToolResult<String>;
}

#[async_trait]
impl<F, Fut> ResourceHandler for F
where
    F: Fn(ToolContext, String) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult<String>> + Send,
{
    async fn read(&self, ctx: &ToolContext, uri: &str) -> ToolResult<String> {
        (self)(ctx.clone(), uri.to_string()).await
    }
}
