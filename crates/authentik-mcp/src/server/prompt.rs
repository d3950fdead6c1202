//! MCP prompt registration types.

use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use super::tool::ToolContext;
use crate::error::ToolResult;

/// Prompt metadata advertised in `prompts/list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromptConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub arguments: Vec<PromptArgument>,
}

impl PromptConfig {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: Some(description.into()), ..Self::default() }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_argument(mut self, argument: PromptArgument) -> Self {
        self.arguments.push(argument);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
}

impl PromptArgument {
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self { name: name.into(), description: None, required: true }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>) -> Self {
        Self { name: name.into(), description: None, required: false }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Speaker of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A text message produced by a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub text: String,
}

impl PromptMessage {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}

impl Serialize for PromptMessage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("PromptMessage", 2)?;
        s.serialize_field("role", &self.role)?;
        s.serialize_field(
            "content",
            &serde_json::json!({ "type": "text", "text": self.text }),
        )?;
        s.end()
    }
}

/// Renders a prompt from its arguments.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(
        &self,
        ctx: &ToolContext,
        arguments: Map<String, Value>,
    ) -> ToolResult<Vec<PromptMessage>>;
}

#[async_trait]
impl<F, Fut> PromptHandler for F
where
    F: Fn(ToolContext, Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult<Vec<PromptMessage>>> + Send,
{
    async fn get(
        &self,
        ctx: &ToolContext,
        arguments: Map<String, Value>,
    ) -> ToolResult<Vec<PromptMessage>> {
        (self)(ctx.clone(), arguments).await
    }
}
