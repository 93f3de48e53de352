pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiClient;
pub use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("request to model endpoint failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model endpoint returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("model response had no choices")]
    EmptyResponse,
    #[error("invalid client configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Usually a JSON object keyed by parameter name.
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One entry of the conversation replayed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A function the model may call, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Anything that can turn a conversation into the next assistant message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> Result<Message, AiError>;
}

/// Helper function to create a tool with the given name, description, and parameters
///
/// # Example
/// ```rust
/// use ai::{create_tool, json};
///
/// let tool = create_tool(
///     "execute_query",
///     "Execute a SQL query against the database",
///     json!({
///         "type": "object",
///         "properties": {
///             "query": {
///                 "type": "string",
///                 "description": "The SQL query to execute",
///             },
///         },
///         "required": ["query"],
///     }),
/// );
/// assert_eq!(tool.name, "execute_query");
/// ```
pub fn create_tool(
    name: impl Into<String>,
    description: impl Into<String>,
    parameters: Value,
) -> Tool {
    Tool {
        name: name.into(),
        description: description.into(),
        parameters,
    }
}
