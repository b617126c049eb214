//! Language model port - one streamed provider step.
//!
//! A *step* is a single chat-completions request. The multi-step tool loop,
//! text smoothing and UI translation are built on top of this port, so an
//! implementation only has to speak its provider's wire format.
//!
//! # Example
//!
//! ```ignore
//! let mut stream = model.stream_step(request).await?;
//! while let Some(event) = stream.next().await {
//!     match event? {
//!         StepEvent::TextDelta(text) => print!("{}", text),
//!         StepEvent::Finish { reason, usage } => break,
//!         _ => {}
//!     }
//! }
//! ```

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;

use crate::domain::chat::{FinishReason, TokenUsage, ToolCall};

/// Port for streaming completions from an AI provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Open one provider step.
    ///
    /// Errors that the provider reports before the first byte (billing,
    /// authentication, connectivity) are returned here rather than inside
    /// the stream.
    async fn stream_step(&self, request: StepRequest) -> Result<StepStream, ModelError>;

    /// Short provider name for logs.
    fn provider_name(&self) -> &'static str;
}

/// Events of one step, ending with [`StepEvent::Finish`].
pub type StepStream = Pin<Box<dyn Stream<Item = Result<StepEvent, ModelError>> + Send>>;

/// Request for a single provider step.
#[derive(Debug, Clone)]
pub struct StepRequest {
    /// Provider model identifier.
    pub model: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
}

impl StepRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ModelMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Provider-agnostic chat message.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelMessage {
    System(String),
    User(Vec<UserContent>),
    Assistant {
        text: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ModelMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        ModelMessage::User(vec![UserContent::Text(text.into())])
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        ModelMessage::Assistant {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Content part of a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserContent {
    Text(String),
    /// Image by URL (including `data:` URLs).
    ImageUrl(String),
}

/// Tool offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments.
    pub parameters: Value,
}

/// Event within one provider step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    TextDelta(String),
    ReasoningDelta(String),
    /// A fully assembled tool call.
    ToolCall(ToolCall),
    Finish {
        reason: FinishReason,
        usage: TokenUsage,
    },
}

/// AI provider errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    /// Rate limited by provider.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u32 },

    /// The provider requires billing to be set up before serving requests.
    #[error("billing required: {message}")]
    BillingRequired { message: String },

    /// Provider is unavailable.
    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    /// API key or authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("network error: {0}")]
    Network(String),

    /// Failed to parse provider response.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u32 },
}

impl ModelError {
    pub fn rate_limited(retry_after_secs: u32) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    pub fn billing_required(message: impl Into<String>) -> Self {
        Self::BillingRequired {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::RateLimited { .. }
                | ModelError::Unavailable { .. }
                | ModelError::Network(_)
                | ModelError::Timeout { .. }
        )
    }

    pub fn is_billing(&self) -> bool {
        matches!(self, ModelError::BillingRequired { .. })
    }
}
