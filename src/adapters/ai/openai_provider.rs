//! OpenAI Provider - LanguageModel over an OpenAI-compatible chat-completions API.
//!
//! Works against OpenAI itself and against gateways that speak the same wire
//! format (including reasoning providers that stream `reasoning_content`).
//!
//! # Configuration
//!
//! ```ignore
//! let config = OpenAIConfig::new(api_key)
//!     .with_base_url("https://api.openai.com/v1")
//!     .with_max_retries(2);
//!
//! let provider = OpenAIProvider::new(config)?;
//! ```
//!
//! # Streaming
//!
//! The response body is Server-Sent Events. Bytes are buffered until a full
//! line arrives and only then decoded as UTF-8. Tool-call fragments are
//! assembled by index. The step ends with a single `StepEvent::Finish`
//! carrying the reported usage.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::time::sleep;

use crate::domain::chat::{FinishReason, TokenUsage, ToolCall};
use crate::ports::{
    LanguageModel, ModelError, ModelMessage, StepEvent, StepRequest, StepStream, ToolDefinition,
    UserContent,
};

/// Gateway message for accounts without a payment method.
const CREDIT_CARD_REQUIRED: &str = "requires a valid credit card on file";

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    api_key: Secret<String>,
    /// Base URL for the API (default: https://api.openai.com/v1).
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retries on transient failures before streaming starts.
    pub max_retries: u32,
}

impl OpenAIConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// OpenAI-compatible provider implementation.
pub struct OpenAIProvider {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::InvalidRequest(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Converts a step request to the chat-completions wire format.
    fn to_openai_request(request: &StepRequest) -> OpenAIRequest {
        OpenAIRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(OpenAIMessage::from_model).collect(),
            tools: request.tools.iter().map(OpenAITool::from_definition).collect(),
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        }
    }

    async fn send_streaming_request(&self, body: &OpenAIRequest) -> Result<Response, ModelError> {
        self.client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key()))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout {
                        timeout_secs: self.config.timeout.as_secs() as u32,
                    }
                } else if e.is_connect() {
                    ModelError::network(format!("Connection failed: {}", e))
                } else {
                    ModelError::network(e.to_string())
                }
            })
    }

    /// Maps a non-success response to a typed error.
    async fn handle_response_status(response: Response) -> Result<Response, ModelError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        Err(Self::classify_error(status.as_u16(), &error_body))
    }

    fn classify_error(status: u16, error_body: &str) -> ModelError {
        if status == 402
            || error_body.contains("insufficient_quota")
            || error_body.contains(CREDIT_CARD_REQUIRED)
        {
            return ModelError::billing_required(Self::error_message(error_body));
        }

        match status {
            401 | 403 => ModelError::AuthenticationFailed,
            429 => ModelError::rate_limited(Self::parse_retry_after(error_body)),
            400 | 404 | 422 => ModelError::InvalidRequest(Self::error_message(error_body)),
            500..=599 => {
                ModelError::unavailable(format!("Server error {}: {}", status, error_body))
            }
            _ => ModelError::network(format!("Unexpected status {}: {}", status, error_body)),
        }
    }

    /// Provider's error message, or the raw body.
    fn error_message(error_body: &str) -> String {
        serde_json::from_str::<Value>(error_body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| error_body.to_string())
    }

    /// Parses "try again in Xs" from a rate-limit message; defaults to 30.
    fn parse_retry_after(error_body: &str) -> u32 {
        let message = Self::error_message(error_body);
        if let Some(idx) = message.find("try again in ") {
            let rest = &message[idx + 13..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(secs) = digits.parse::<u32>() {
                return secs;
            }
        }
        30
    }
}

#[async_trait]
impl LanguageModel for OpenAIProvider {
    async fn stream_step(&self, request: StepRequest) -> Result<StepStream, ModelError> {
        let body = Self::to_openai_request(&request);
        let mut retry_count = 0;

        let response = loop {
            let attempt = match self.send_streaming_request(&body).await {
                Ok(response) => Self::handle_response_status(response).await,
                Err(err) => Err(err),
            };

            match attempt {
                Ok(response) => break response,
                Err(err) if err.is_retryable() && retry_count < self.config.max_retries => {
                    tracing::warn!(
                        error = %err,
                        attempt = retry_count + 1,
                        model = %request.model,
                        "retrying provider request"
                    );
                    // Exponential backoff: 1s, 2s, 4s, ...
                    sleep(Duration::from_secs(1 << retry_count)).await;
                    retry_count += 1;
                }
                Err(err) => return Err(err),
            }
        };

        let state = (response.bytes_stream().boxed(), StepDecoder::default(), VecDeque::new(), false);

        let events = stream::unfold(state, |(mut bytes, mut decoder, mut pending, mut done)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((event, (bytes, decoder, pending, done)));
                }
                if done {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                    Some(Err(e)) => {
                        pending.push_back(Err(ModelError::network(format!("Stream error: {}", e))));
                        done = true;
                    }
                    None => {
                        pending.extend(decoder.finish());
                        done = true;
                    }
                }
            }
        });

        Ok(Box::pin(events))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Incremental decoder for one streamed step.
#[derive(Debug, Default)]
struct StepDecoder {
    /// Raw bytes of the current incomplete line; a character may straddle chunks.
    line_buffer: Vec<u8>,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
    finished: bool,
}

impl StepDecoder {
    /// Consume a network chunk, returning events for every complete line.
    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<StepEvent, ModelError>> {
        self.line_buffer.extend_from_slice(bytes);

        let mut results = Vec::new();
        while let Some(newline) = self.line_buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.line_buffer.drain(..=newline).collect();
            self.parse_raw_line(&line, &mut results);
        }
        results
    }

    fn parse_raw_line(&mut self, line: &[u8], results: &mut Vec<Result<StepEvent, ModelError>>) {
        match std::str::from_utf8(line) {
            Ok(line) => self.parse_line(line.trim_end_matches(['\r', '\n']), results),
            Err(e) => results.push(Err(ModelError::parse(format!(
                "invalid UTF-8 in streaming response: {}",
                e
            )))),
        }
    }

    /// End of body: flush any trailing line and close the step.
    fn finish(&mut self) -> Vec<Result<StepEvent, ModelError>> {
        let mut results = Vec::new();
        if !self.line_buffer.is_empty() {
            let line = std::mem::take(&mut self.line_buffer);
            self.parse_raw_line(&line, &mut results);
        }
        if !self.finished {
            if self.finish_reason.is_some() {
                self.complete(&mut results);
            } else {
                results.push(Err(ModelError::network("stream ended before completion")));
                self.finished = true;
            }
        }
        results
    }

    fn parse_line(&mut self, line: &str, results: &mut Vec<Result<StepEvent, ModelError>>) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();

        if data == "[DONE]" {
            if !self.finished {
                self.complete(results);
            }
            return;
        }
        if data.is_empty() || self.finished {
            return;
        }

        let chunk = match serde_json::from_str::<StreamResponseChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                results.push(Err(ModelError::parse(format!("Failed to parse SSE chunk: {}", e))));
                return;
            }
        };

        if let Some(error) = chunk.error {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("provider reported an error")
                .to_string();
            results.push(Err(ModelError::unavailable(message)));
            return;
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage.into());
        }

        for choice in chunk.choices {
            let delta = choice.delta;
            if let Some(reasoning) = delta.reasoning_content.or(delta.reasoning) {
                if !reasoning.is_empty() {
                    results.push(Ok(StepEvent::ReasoningDelta(reasoning)));
                }
            }
            if let Some(content) = delta.content {
                if !content.is_empty() {
                    results.push(Ok(StepEvent::TextDelta(content)));
                }
            }
            for fragment in delta.tool_calls {
                let call = self.tool_calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id {
                    call.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        call.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        call.arguments.push_str(&arguments);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
        }
    }

    /// Emit assembled tool calls, then the terminal finish event.
    fn complete(&mut self, results: &mut Vec<Result<StepEvent, ModelError>>) {
        self.finished = true;

        for (index, call) in std::mem::take(&mut self.tool_calls) {
            let arguments = if call.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.arguments).unwrap_or(Value::String(call.arguments))
            };
            let id = if call.id.is_empty() {
                format!("call_{}", index)
            } else {
                call.id
            };
            results.push(Ok(StepEvent::ToolCall(ToolCall {
                id,
                name: call.name,
                arguments,
            })));
        }

        let reason = self
            .finish_reason
            .as_deref()
            .map(FinishReason::from_provider)
            .unwrap_or(FinishReason::Stop);
        results.push(Ok(StepEvent::Finish {
            reason,
            usage: self.usage.unwrap_or_default(),
        }));
    }
}

// ----- OpenAI API Types -----

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAITool>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<OpenAIContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAIToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAIMessage {
    fn from_model(message: &ModelMessage) -> Self {
        let plain = |role, content| Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        };

        match message {
            ModelMessage::System(text) => plain("system", Some(OpenAIContent::Text(text.clone()))),
            ModelMessage::User(parts) => {
                let content = match parts.as_slice() {
                    [UserContent::Text(text)] => OpenAIContent::Text(text.clone()),
                    _ => OpenAIContent::Parts(
                        parts
                            .iter()
                            .map(|part| match part {
                                UserContent::Text(text) => {
                                    OpenAIContentPart::Text { text: text.clone() }
                                }
                                UserContent::ImageUrl(url) => OpenAIContentPart::ImageUrl {
                                    image_url: ImageUrl { url: url.clone() },
                                },
                            })
                            .collect(),
                    ),
                };
                plain("user", Some(content))
            }
            ModelMessage::Assistant { text, tool_calls } => Self {
                role: "assistant",
                content: text.clone().map(OpenAIContent::Text),
                tool_calls: tool_calls
                    .iter()
                    .map(|call| OpenAIToolCall {
                        id: call.id.clone(),
                        kind: "function",
                        function: OpenAIFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect(),
                tool_call_id: None,
            },
            ModelMessage::Tool {
                tool_call_id,
                content,
            } => Self {
                role: "tool",
                content: Some(OpenAIContent::Text(content.clone())),
                tool_calls: Vec::new(),
                tool_call_id: Some(tool_call_id.clone()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAIContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAIFunction,
}

impl OpenAITool {
    fn from_definition(definition: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: OpenAIFunction {
                name: definition.name.clone(),
                description: definition.description.clone(),
                parameters: definition.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: Option<u32>,
}

impl From<OpenAIUsage> for TokenUsage {
    fn from(usage: OpenAIUsage) -> Self {
        TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            reasoning_tokens: usage
                .completion_tokens_details
                .and_then(|d| d.reasoning_tokens)
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamResponseChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<OpenAIUsage>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: u32,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
