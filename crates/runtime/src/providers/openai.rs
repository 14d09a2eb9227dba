//! OpenAI-compatible chat completions backend.
//!
//! Works with any endpoint exposing `POST {base_url}/chat/completions` in the
//! OpenAI shape (DeepSeek, OpenRouter, vLLM, llama.cpp server, ...).

use std::time::Duration;

use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolSpec,
    Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Completion token budget per request.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseToolCall {
    id: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiBackendBuilder {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<OpenAiBackend, ModelError> {
        validate_base_url(&self.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ModelError::Config(format!("http client: {e}")))?;
        Ok(OpenAiBackend {
            client,
            api_key: self.api_key,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            model: self.model,
            max_tokens: self.max_tokens,
        })
    }
}

/// HTTPS anywhere; plain HTTP only for a server on this machine.
fn validate_base_url(base_url: &str) -> Result<(), ModelError> {
    let parsed = reqwest::Url::parse(base_url)
        .map_err(|e| ModelError::Config(format!("invalid base url {base_url:?}: {e}")))?;
    let host = parsed.host_str().unwrap_or_default();
    match parsed.scheme() {
        "https" => Ok(()),
        "http" if matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1") => {
            warn!(base_url, "using unencrypted http for a local model server");
            Ok(())
        }
        "http" => Err(ModelError::Config(format!(
            "plain http is only allowed for localhost, got {base_url:?}"
        ))),
        scheme => Err(ModelError::Config(format!("unsupported url scheme {scheme:?}"))),
    }
}

/// OpenAI-compatible chat completions backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiBackend {
    pub fn builder(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(api_key, base_url, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    /// One of our messages becomes one API message, except that every tool
    /// output travels as its own `tool` message.
    fn message_to_api(msg: &Message) -> Vec<ApiMessage> {
        let mut tool_outputs = Vec::new();
        let mut tool_calls = Vec::new();
        for part in &msg.parts {
            match part {
                Part::ToolCall(call) => tool_calls.push(ApiToolCall {
                    id: call.id.clone(),
                    call_type: "function",
                    function: ApiFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                }),
                Part::ToolOutput(output) => tool_outputs.push(ApiMessage {
                    role: "tool",
                    content: Some(output.content.clone()),
                    tool_calls: Vec::new(),
                    tool_call_id: Some(output.tool_call_id.clone()),
                }),
                Part::Text(_) => {}
            }
        }
        if !tool_outputs.is_empty() {
            return tool_outputs;
        }

        let text = msg.text();
        let content = if text.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(text)
        };
        vec![ApiMessage {
            role: Self::role_to_api(msg.role),
            content,
            tool_calls,
            tool_call_id: None,
        }]
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool<'_> {
        ApiTool {
            tool_type: "function",
            function: ApiFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.schema,
            },
        }
    }

    fn response_to_message(response: ApiResponse) -> Result<(Message, Usage), ModelError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".into()))?;

        let mut parts = Vec::new();
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            parts.push(Part::Text(text));
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            parts.push(Part::ToolCall(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            }));
        }

        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok((
            Message {
                role: Role::Assistant,
                parts,
            },
            usage,
        ))
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai-compatible({}, {})", self.model, self.base_url)
    }
}

impl Backend for OpenAiBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = ApiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: request
                .messages
                .iter()
                .flat_map(Self::message_to_api)
                .collect(),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
        };

        let url = format!("{}/chat/completions", self.base_url);
        info!(
            model = %self.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.len(),
            "calling model"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(ModelError::Api(format!("{status}: {body}")));
        }
        debug!(bytes = body.len(), "model response received");

        let api_response: ApiResponse = serde_json::from_str(&body)
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        let (message, usage) = Self::response_to_message(api_response)?;
        Ok(ModelResponse { message, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<(Message, Usage), ModelError> {
        OpenAiBackend::response_to_message(serde_json::from_str(body).unwrap())
    }

    #[test]
    fn base_url_rules() {
        assert!(validate_base_url("https://api.deepseek.com/v1").is_ok());
        assert!(validate_base_url("http://localhost:8080/v1").is_ok());
        assert!(validate_base_url("http://example.com/v1").is_err());
        assert!(validate_base_url("ftp://example.com").is_err());
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn builder_trims_trailing_slash() {
        let backend = OpenAiBackend::builder("key", "https://api.example.com/v1/", "m")
            .build()
            .unwrap();
        assert_eq!(backend.to_string(), "openai-compatible(m, https://api.example.com/v1)");
    }

    #[test]
    fn parses_tool_calls() {
        let (message, usage) = parse(
            r#"{
                "choices": [{"message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_1", "type": "function",
                         "function": {"name": "bin_packing", "arguments": "{\"items\":[5,5]}"}},
                        {"id": "call_2", "type": "function",
                         "function": {"name": "foo", "arguments": ""}}
                    ]
                }}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3}
            }"#,
        )
        .unwrap();
        let calls = message.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, "{\"items\":[5,5]}");
        assert_eq!(calls[1].name, "foo");
        assert!(message.text().is_empty());
        assert_eq!(usage.input_tokens, 12);
    }

    #[test]
    fn parses_plain_answer_with_null_tool_calls() {
        let (message, usage) = parse(
            r#"{"choices": [{"message": {"content": "Use two bins.", "tool_calls": null}}]}"#,
        )
        .unwrap();
        assert_eq!(message.text(), "Use two bins.");
        assert!(message.tool_calls().is_empty());
        assert_eq!(usage, Usage::default());
    }

    #[test]
    fn empty_choices_is_invalid() {
        assert!(matches!(
            parse(r#"{"choices": []}"#),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn assistant_tool_calls_have_null_content() {
        let msg = Message {
            role: Role::Assistant,
            parts: vec![Part::ToolCall(ToolCall {
                id: "call_1".into(),
                name: "set_cover".into(),
                arguments: "{}".into(),
            })],
        };
        let api = OpenAiBackend::message_to_api(&msg);
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].content, None);
        let json = serde_json::to_value(&api[0]).unwrap();
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "set_cover");
        assert!(json.get("content").is_none());
    }

    #[test]
    fn tool_outputs_become_tool_messages() {
        let api = OpenAiBackend::message_to_api(&Message::tool("call_9", "{\"error\":\"boom\"}"));
        assert_eq!(
            api,
            vec![ApiMessage {
                role: "tool",
                content: Some("{\"error\":\"boom\"}".into()),
                tool_calls: Vec::new(),
                tool_call_id: Some("call_9".into()),
            }]
        );
    }

    #[test]
    fn request_serializes_in_openai_shape() {
        let spec = ToolSpec {
            name: "pagerank".into(),
            description: "Rank nodes".into(),
            schema: serde_json::json!({"type": "object"}),
        };
        let request = ApiRequest {
            model: "deepseek-chat",
            max_tokens: DEFAULT_MAX_TOKENS,
            messages: OpenAiBackend::message_to_api(&Message::system("be brief")),
            tools: vec![OpenAiBackend::tool_to_api(&spec)],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be brief");
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["parameters"]["type"], "object");
    }
}
