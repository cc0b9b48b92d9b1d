//! Minimal Anthropic Claude API client.
//!
//! One non-streaming call, `Claude::complete`, plus the types needed to
//! carry a tool-use conversation through it. The endpoint and the
//! per-request timeout are configurable so callers can bound every call.

use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when using the Claude client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else if err.is_decode() {
            Error::Parse(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

/// Claude API client.
#[derive(Clone)]
pub struct Claude {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl Claude {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: http_client(DEFAULT_TIMEOUT),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Read `ANTHROPIC_API_KEY`, and `ANTHROPIC_BASE_URL` when set.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(Error::NoApiKey)?;
        let client = Self::new(api_key);
        Ok(match std::env::var("ANTHROPIC_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => client.with_base_url(url),
            _ => client,
        })
    }

    /// Model used when a request does not name one.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Messages API root, e.g. a local proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = http_client(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        let body = wire::Body::new(&request, &self.model);
        tracing::debug!(
            model = body.model,
            messages = body.messages.len(),
            tool_choice = ?request.tool_choice,
            "sending Claude completion"
        );

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let reply: wire::Reply = response.json().await?;
        Ok(reply.into())
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .build()
        .unwrap_or_default()
}

// ============================================================================
// Conversation types
// ============================================================================

/// A completion request to send to Claude.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub max_tokens: usize,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub tools: Option<Vec<Tool>>,
    pub tool_choice: Option<ToolChoice>,
}

impl Request {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            max_tokens: 4096,
            system: None,
            messages,
            temperature: None,
            tools: None,
            tool_choice: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// The user turn answering a batch of tool calls.
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: results,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn tool_result(tool_use_id: impl Into<String>, result: ToolResult) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: result.content,
            is_error: result.is_error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Whether the model may call the declared tools on this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    /// Tools stay declared but the model must answer in text.
    None,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl Response {
    /// All text blocks, concatenated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool calls requested in this response, in order.
    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Whether the model stopped to wait for tool results.
    pub fn wants_tools(&self) -> bool {
        self.stop_reason == StopReason::ToolUse
            && self
                .content
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    /// This response as the assistant turn of a continued conversation.
    pub fn into_turn(self) -> Message {
        Message {
            role: Role::Assistant,
            content: self.content,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Outcome of serving one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

// ============================================================================
// Wire format
// ============================================================================

mod wire {
    use super::{ContentBlock, Request, Response, Role, StopReason, ToolChoice, Usage};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize)]
    pub(super) struct Body<'a> {
        pub(super) model: &'a str,
        max_tokens: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        system: Option<&'a str>,
        pub(super) messages: Vec<Turn<'a>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tools: Vec<ToolSpec<'a>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_choice: Option<Choice>,
    }

    impl<'a> Body<'a> {
        pub(super) fn new(request: &'a Request, default_model: &'a str) -> Self {
            Self {
                model: request.model.as_deref().unwrap_or(default_model),
                max_tokens: request.max_tokens,
                system: request.system.as_deref(),
                messages: request
                    .messages
                    .iter()
                    .map(|m| Turn {
                        role: match m.role {
                            Role::User => "user",
                            Role::Assistant => "assistant",
                        },
                        content: m.content.iter().map(Block::from).collect(),
                    })
                    .collect(),
                temperature: request.temperature,
                tools: request
                    .tools
                    .iter()
                    .flatten()
                    .map(|t| ToolSpec {
                        name: &t.name,
                        description: &t.description,
                        input_schema: &t.input_schema,
                    })
                    .collect(),
                tool_choice: request.tool_choice.map(|choice| Choice {
                    kind: match choice {
                        ToolChoice::Auto => "auto",
                        ToolChoice::None => "none",
                    },
                }),
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub(super) struct Turn<'a> {
        role: &'static str,
        content: Vec<Block<'a>>,
    }

    #[derive(Debug, Serialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub(super) enum Block<'a> {
        Text {
            text: &'a str,
        },
        ToolUse {
            id: &'a str,
            name: &'a str,
            input: &'a serde_json::Value,
        },
        ToolResult {
            tool_use_id: &'a str,
            content: &'a str,
            is_error: bool,
        },
    }

    impl<'a> From<&'a ContentBlock> for Block<'a> {
        fn from(block: &'a ContentBlock) -> Self {
            match block {
                ContentBlock::Text { text } => Block::Text { text },
                ContentBlock::ToolUse { id, name, input } => Block::ToolUse { id, name, input },
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Block::ToolResult {
                    tool_use_id,
                    content,
                    is_error: *is_error,
                },
            }
        }
    }

    #[derive(Debug, Serialize)]
    struct ToolSpec<'a> {
        name: &'a str,
        description: &'a str,
        input_schema: &'a serde_json::Value,
    }

    #[derive(Debug, Serialize)]
    struct Choice {
        #[serde(rename = "type")]
        kind: &'static str,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Reply {
        id: String,
        model: String,
        content: Vec<ReplyBlock>,
        #[serde(default)]
        stop_reason: Option<String>,
        usage: ReplyUsage,
    }

    /// Block kinds this client does not use (thinking and the like) are
    /// read and discarded so they are never echoed back.
    #[derive(Debug, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum ReplyBlock {
        Text {
            text: String,
        },
        ToolUse {
            id: String,
            name: String,
            input: serde_json::Value,
        },
        #[serde(other)]
        Other,
    }

    #[derive(Debug, Deserialize)]
    struct ReplyUsage {
        input_tokens: usize,
        output_tokens: usize,
    }

    impl From<Reply> for Response {
        fn from(reply: Reply) -> Self {
            Response {
                id: reply.id,
                model: reply.model,
                content: reply
                    .content
                    .into_iter()
                    .filter_map(|block| match block {
                        ReplyBlock::Text { text } => Some(ContentBlock::Text { text }),
                        ReplyBlock::ToolUse { id, name, input } => {
                            Some(ContentBlock::ToolUse { id, name, input })
                        }
                        ReplyBlock::Other => None,
                    })
                    .collect(),
                stop_reason: match reply.stop_reason.as_deref() {
                    Some("max_tokens") => StopReason::MaxTokens,
                    Some("stop_sequence") => StopReason::StopSequence,
                    Some("tool_use") => StopReason::ToolUse,
                    _ => StopReason::EndTurn,
                },
                usage: Usage {
                    input_tokens: reply.usage.input_tokens,
                    output_tokens: reply.usage.output_tokens,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(raw: serde_json::Value) -> Response {
        serde_json::from_value::<wire::Reply>(raw).unwrap().into()
    }

    fn fact_tool() -> Tool {
        Tool {
            name: "get_educational_fact".to_string(),
            description: "Look up a fact".to_string(),
            input_schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_client_defaults_and_overrides() {
        let client = Claude::new("test-key");
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.base_url, API_BASE);

        let client = client
            .with_model("claude-3-5-haiku-20241022")
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(client.model(), "claude-3-5-haiku-20241022");
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_body_uses_client_model_unless_request_names_one() {
        let request = Request::new(vec![Message::user("Hello")])
            .with_system("You are a storyteller")
            .with_max_tokens(1000)
            .with_temperature(0.7);
        let value = serde_json::to_value(wire::Body::new(&request, "fallback-model")).unwrap();
        assert_eq!(value["model"], "fallback-model");
        assert_eq!(value["max_tokens"], 1000);
        assert_eq!(value["system"], "You are a storyteller");
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());

        let request = request.with_model("claude-judge");
        let value = serde_json::to_value(wire::Body::new(&request, "fallback-model")).unwrap();
        assert_eq!(value["model"], "claude-judge");
    }

    #[test]
    fn test_body_with_tools_and_choice() {
        let mut request = Request::new(vec![Message::user("A story about Mars")]);
        request.tools = Some(vec![fact_tool()]);
        request.tool_choice = Some(ToolChoice::Auto);

        let value = serde_json::to_value(wire::Body::new(&request, DEFAULT_MODEL)).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"][0]["type"], "text");
        assert_eq!(value["tools"][0]["name"], "get_educational_fact");
        assert_eq!(value["tool_choice"], json!({"type": "auto"}));

        request.tool_choice = Some(ToolChoice::None);
        let value = serde_json::to_value(wire::Body::new(&request, DEFAULT_MODEL)).unwrap();
        assert_eq!(value["tool_choice"], json!({"type": "none"}));
        assert_eq!(value["tools"][0]["name"], "get_educational_fact");
    }

    #[test]
    fn test_tool_result_block_serialization() {
        let block = ContentBlock::tool_result("toolu_1", ToolResult::error("no such tool"));
        let value = serde_json::to_value(wire::Block::from(&block)).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert_eq!(value["tool_use_id"], "toolu_1");
        assert_eq!(value["is_error"], true);
    }

    #[test]
    fn test_parse_tool_use_response() {
        let response = reply(json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "get_educational_fact", "input": {"topic": "Mars"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 7}
        }));

        assert!(response.wants_tools());
        assert_eq!(response.text(), "Let me check.");
        let uses = response.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].input["topic"], "Mars");
        assert_eq!(response.usage.output_tokens, 7);
    }

    #[test]
    fn test_thinking_blocks_are_not_echoed() {
        let response = reply(json!({
            "id": "msg_3",
            "model": "m",
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "sig"},
                {"type": "tool_use", "id": "toolu_9", "name": "get_educational_fact", "input": {"topic": "ocean"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        }));
        assert_eq!(response.content.len(), 1);

        let turn = response.into_turn();
        assert_eq!(turn.role, Role::Assistant);
        let request = Request::new(vec![Message::user("hi"), turn]);
        let value = serde_json::to_value(wire::Body::new(&request, "m")).unwrap();
        assert_eq!(value["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(value["messages"][1]["content"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_missing_stop_reason_defaults_to_end_turn() {
        let response = reply(json!({
            "id": "msg_2",
            "model": "m",
            "content": [{"type": "text", "text": "Once upon a time"}],
            "stop_reason": null,
            "usage": {"input_tokens": 1, "output_tokens": 1}
        }));
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert!(!response.wants_tools());
    }

    #[test]
    fn test_tool_result() {
        let success = ToolResult::success("worked");
        assert!(!success.is_error);
        assert_eq!(success.content, "worked");

        let error = ToolResult::error("failed");
        assert!(error.is_error);
        assert_eq!(error.content, "failed");
    }
}
