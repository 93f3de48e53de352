use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AiError, ChatModel, Message, Role, Tool, ToolCall};

/// Client for any endpoint speaking the OpenAI chat completions protocol.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Fails when the API key cannot be used as a header value or the HTTP
    /// client cannot be built.
    pub fn new(
        api_key: &str,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, AiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        if !api_key.is_empty() {
            let auth = header::HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| AiError::Config(format!("invalid API key format: {e}")))?;
            headers.insert(header::AUTHORIZATION, auth);
        }

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
        })
    }

    /// # Errors
    ///
    /// See [`OpenAiClient::new`].
    pub fn from_config(conf: &config::AIConfig, api_key: &str) -> Result<Self, AiError> {
        let mut client = Self::new(api_key, conf.url.clone(), conf.model.clone())?;
        client.temperature = conf.temperature;
        client.max_tokens = conf.max_tokens;
        Ok(client)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> Result<Message, AiError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire).collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: tools.iter().map(to_wire_tool).collect(),
            tool_choice: (!tools.is_empty()).then_some("auto"),
        };

        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map_or(body, |err| err.error.message);
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&body).map_err(|e| AiError::Api {
            status: status.as_u16(),
            message: format!("unreadable completion body: {e}"),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| from_wire(choice.message))
            .ok_or(AiError::EmptyResponse)
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn to_wire(message: &Message) -> WireMessage {
    let tool_calls = message.requests_tools().then(|| {
        message
            .tool_calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                call_type: function_type(),
                function: WireFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.to_string(),
                },
            })
            .collect()
    });

    // Assistant turns that only carry tool calls are sent with null content.
    let content = if message.role == Role::Assistant
        && message.content.is_empty()
        && tool_calls.is_some()
    {
        None
    } else {
        Some(message.content.clone())
    };

    WireMessage {
        role: role_name(message.role).to_string(),
        content,
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn to_wire_tool(tool: &Tool) -> WireTool<'_> {
    WireTool {
        tool_type: "function",
        function: WireFunction {
            name: &tool.name,
            description: &tool.description,
            parameters: &tool.parameters,
        },
    }
}

fn from_wire(message: WireMessage) -> Message {
    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = parse_arguments(&call.function.arguments);
            ToolCall::new(call.id, call.function.name, arguments)
        })
        .collect();

    Message::assistant_with_tools(message.content.unwrap_or_default(), tool_calls)
}

/// Arguments arrive as a JSON-encoded string; anything unparseable is kept
/// verbatim so the tool can report it.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("tool arguments are not valid JSON: {e}");
        Value::String(raw.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_only_assistant_turn_has_null_content() {
        let msg = Message::assistant_with_tools(
            "",
            vec![ToolCall::new(
                "call_1",
                "execute_query",
                json!({"query": "SELECT 1"}),
            )],
        );

        let wire = serde_json::to_value(to_wire(&msg)).unwrap();
        assert_eq!(wire["role"], "assistant");
        assert!(wire.get("content").is_none());
        assert_eq!(wire["tool_calls"][0]["type"], "function");
        assert_eq!(
            wire["tool_calls"][0]["function"]["arguments"],
            r#"{"query":"SELECT 1"}"#
        );
    }

    #[test]
    fn tool_result_carries_call_id() {
        let wire = serde_json::to_value(to_wire(&Message::tool_result("call_7", "ok"))).unwrap();
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_7");
        assert_eq!(wire["content"], "ok");
    }

    #[test]
    fn parses_tool_calls_from_response() {
        let body = json!({
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "a", "type": "function", "function": {"name": "list_tables", "arguments": ""}},
                        {"id": "b", "type": "function", "function": {"name": "describe_table", "arguments": "{\"table\":\"actor\"}"}}
                    ]
                }
            }]
        });

        let parsed: CompletionResponse = serde_json::from_value(body).unwrap();
        let msg = from_wire(parsed.choices.into_iter().next().unwrap().message);

        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "");
        assert_eq!(msg.tool_calls.len(), 2);
        assert_eq!(msg.tool_calls[0].arguments, json!({}));
        assert_eq!(msg.tool_calls[1].name, "describe_table");
        assert_eq!(msg.tool_calls[1].arguments, json!({"table": "actor"}));
    }

    #[test]
    fn malformed_arguments_are_kept_verbatim() {
        assert_eq!(parse_arguments("{not json"), json!("{not json"));
    }

    #[test]
    fn request_omits_tools_when_none_bound() {
        let request = CompletionRequest {
            model: "m",
            messages: vec![to_wire(&Message::user("hi"))],
            temperature: 0.0,
            max_tokens: None,
            tools: vec![],
            tool_choice: None,
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert!(wire.get("tools").is_none());
        assert!(wire.get("tool_choice").is_none());
        assert!(wire.get("max_tokens").is_none());
    }

    #[test]
    fn client_builds_from_config() {
        let conf = config::AIConfig::default();
        let client = OpenAiClient::from_config(&conf, "secret").unwrap();
        assert_eq!(client.model(), "gemini-2.5-flash");
    }
}
