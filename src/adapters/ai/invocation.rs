//! Model invocation - the multi-step loop on top of a `LanguageModel`.
//!
//! An invocation converts stored conversation history into provider
//! messages, opens the first provider step eagerly (so billing and
//! connectivity failures surface before any response is streamed), then
//! runs the remaining steps on a spawned task. Output is delivered as
//! [`ModelEvent`]s on a bounded channel; the channel closes after the
//! terminal `Finish` event or after an error.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::smoothing::WordChunker;
use crate::config::{AiConfig, StreamingConfig};
use crate::domain::chat::{
    ChatMessage, MessagePart, MessageRole, ModelEvent, TokenUsage, ToolCall, ToolState,
};
use crate::ports::{
    LanguageModel, ModelError, ModelMessage, StepEvent, StepRequest, StepStream, ToolExecutor,
    UserContent,
};

/// Client model id that selects the reasoning model.
pub const REASONING_MODEL_ID: &str = "chat-model-reasoning";

const EVENT_BUFFER: usize = 64;

/// Settings shared by every invocation.
#[derive(Debug, Clone)]
pub struct InvocationSettings {
    pub chat_model: String,
    pub reasoning_model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_steps: u32,
    pub smoothing_delay: Duration,
}

impl InvocationSettings {
    pub fn from_config(ai: &AiConfig, streaming: &StreamingConfig) -> Self {
        Self {
            chat_model: ai.chat_model.clone(),
            reasoning_model: ai.reasoning_model.clone(),
            system_prompt: Some(ai.system_prompt.clone()).filter(|p| !p.trim().is_empty()),
            max_steps: streaming.max_steps,
            smoothing_delay: streaming.smoothing_delay(),
        }
    }

    /// Resolves the provider model for a client-selected chat model.
    pub fn model_for(&self, selected_chat_model: &str) -> &str {
        match (selected_chat_model, self.reasoning_model.as_deref()) {
            (REASONING_MODEL_ID, Some(reasoning)) => reasoning,
            _ => &self.chat_model,
        }
    }
}

impl Default for InvocationSettings {
    fn default() -> Self {
        Self::from_config(&AiConfig::default(), &StreamingConfig::default())
    }
}

/// A running invocation.
pub struct Invocation {
    pub events: mpsc::Receiver<Result<ModelEvent, ModelError>>,
    pub task: JoinHandle<()>,
}

/// Runs model invocations.
#[derive(Clone)]
pub struct ModelInvoker {
    model: Arc<dyn LanguageModel>,
    tools: Arc<dyn ToolExecutor>,
    settings: InvocationSettings,
}

impl ModelInvoker {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tools: Arc<dyn ToolExecutor>,
        settings: InvocationSettings,
    ) -> Self {
        Self {
            model,
            tools,
            settings,
        }
    }

    pub fn settings(&self) -> &InvocationSettings {
        &self.settings
    }

    /// Start an invocation over `history`, whose last entry is the new user message.
    ///
    /// # Errors
    ///
    /// Any error from opening the first provider step, including
    /// `ModelError::BillingRequired`.
    pub async fn invoke(
        &self,
        selected_chat_model: &str,
        history: &[ChatMessage],
    ) -> Result<Invocation, ModelError> {
        let model_id = self.settings.model_for(selected_chat_model).to_string();

        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = &self.settings.system_prompt {
            messages.push(ModelMessage::System(prompt.clone()));
        }
        messages.extend(to_model_messages(history));

        let definitions = self.tools.definitions();
        let first = self
            .model
            .stream_step(StepRequest::new(&model_id, messages.clone()).with_tools(definitions.clone()))
            .await?;

        tracing::debug!(
            provider = self.model.provider_name(),
            model = %model_id,
            messages = messages.len(),
            "model invocation started"
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let step_loop = StepLoop {
            model: self.model.clone(),
            tools: self.tools.clone(),
            model_id,
            messages,
            definitions,
            max_steps: self.settings.max_steps.max(1),
            smoothing_delay: self.settings.smoothing_delay,
            tx,
        };

        let task = tokio::spawn(async move {
            if step_loop.run(first).await.is_err() {
                tracing::debug!("invocation receiver dropped; stopping step loop");
            }
        });

        Ok(Invocation { events: rx, task })
    }
}

/// The receiving side went away.
struct ChannelClosed;

struct StepLoop {
    model: Arc<dyn LanguageModel>,
    tools: Arc<dyn ToolExecutor>,
    model_id: String,
    messages: Vec<ModelMessage>,
    definitions: Vec<crate::ports::ToolDefinition>,
    max_steps: u32,
    smoothing_delay: Duration,
    tx: mpsc::Sender<Result<ModelEvent, ModelError>>,
}

impl StepLoop {
    async fn emit(&self, event: ModelEvent) -> Result<(), ChannelClosed> {
        self.tx.send(Ok(event)).await.map_err(|_| ChannelClosed)
    }

    async fn fail(&self, error: ModelError) -> Result<(), ChannelClosed> {
        tracing::warn!(error = %error, model = %self.model_id, "model step failed");
        self.tx.send(Err(error)).await.map_err(|_| ChannelClosed)
    }

    async fn emit_text(&self, chunk: String) -> Result<(), ChannelClosed> {
        self.emit(ModelEvent::TextDelta(chunk)).await?;
        if !self.smoothing_delay.is_zero() {
            tokio::time::sleep(self.smoothing_delay).await;
        }
        Ok(())
    }

    async fn flush_text(&self, chunker: &mut WordChunker) -> Result<(), ChannelClosed> {
        match chunker.flush() {
            Some(rest) => self.emit(ModelEvent::TextDelta(rest)).await,
            None => Ok(()),
        }
    }

    async fn run(mut self, first: StepStream) -> Result<(), ChannelClosed> {
        let mut total = TokenUsage::default();
        let mut stream = first;
        let mut step = 1;

        loop {
            self.emit(ModelEvent::StepStart).await?;

            let mut chunker = WordChunker::new();
            let mut text = String::new();
            let mut calls: Vec<ToolCall> = Vec::new();
            let mut finish = None;

            while let Some(event) = stream.next().await {
                match event {
                    Ok(StepEvent::TextDelta(delta)) => {
                        text.push_str(&delta);
                        for chunk in chunker.push(&delta) {
                            self.emit_text(chunk).await?;
                        }
                    }
                    Ok(StepEvent::ReasoningDelta(delta)) => {
                        self.flush_text(&mut chunker).await?;
                        self.emit(ModelEvent::ReasoningDelta(delta)).await?;
                    }
                    Ok(StepEvent::ToolCall(call)) => {
                        self.flush_text(&mut chunker).await?;
                        calls.push(call.clone());
                        self.emit(ModelEvent::ToolCall(call)).await?;
                    }
                    Ok(StepEvent::Finish { reason, usage }) => {
                        finish = Some((reason, usage));
                        break;
                    }
                    Err(error) => {
                        self.flush_text(&mut chunker).await?;
                        return self.fail(error).await;
                    }
                }
            }
            self.flush_text(&mut chunker).await?;

            let Some((reason, usage)) = finish else {
                return self
                    .fail(ModelError::network("provider step ended without a finish event"))
                    .await;
            };
            total += usage;

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let output = self.tools.execute(call).await;
                self.emit(ModelEvent::ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    output: output.clone(),
                })
                .await?;
                results.push((call.id.clone(), output));
            }

            self.emit(ModelEvent::StepFinish { reason, usage }).await?;

            if calls.is_empty() || step >= self.max_steps {
                if !calls.is_empty() {
                    tracing::info!(steps = step, "model step limit reached");
                }
                return self.emit(ModelEvent::Finish { reason, usage: total }).await;
            }

            self.messages.push(ModelMessage::Assistant {
                text: Some(text).filter(|t| !t.is_empty()),
                tool_calls: calls,
            });
            for (tool_call_id, output) in results {
                self.messages.push(ModelMessage::Tool {
                    tool_call_id,
                    content: tool_output_text(&output),
                });
            }

            let request = StepRequest::new(&self.model_id, self.messages.clone())
                .with_tools(self.definitions.clone());
            stream = match self.model.stream_step(request).await {
                Ok(stream) => stream,
                Err(error) => return self.fail(error).await,
            };
            step += 1;
        }
    }
}

fn tool_output_text(output: &Result<serde_json::Value, String>) -> String {
    match output {
        Ok(serde_json::Value::String(text)) => text.clone(),
        Ok(value) => value.to_string(),
        Err(error) => format!("Error: {}", error),
    }
}

/// Converts stored messages into provider messages.
///
/// Reasoning and step markers are dropped. Settled tool parts become an
/// assistant tool call followed by a tool result message; each step of an
/// assistant message becomes its own assistant turn.
pub fn to_model_messages(history: &[ChatMessage]) -> Vec<ModelMessage> {
    let mut out = Vec::with_capacity(history.len());

    for message in history {
        match message.role {
            MessageRole::System => {
                let text = message.text_content();
                if !text.is_empty() {
                    out.push(ModelMessage::System(text));
                }
            }
            MessageRole::User => {
                let content: Vec<UserContent> = message
                    .parts
                    .iter()
                    .filter_map(|part| match part {
                        MessagePart::Text { text } if !text.is_empty() => {
                            Some(UserContent::Text(text.clone()))
                        }
                        MessagePart::File { media_type, url, .. }
                            if media_type.starts_with("image/") =>
                        {
                            Some(UserContent::ImageUrl(url.clone()))
                        }
                        _ => None,
                    })
                    .collect();
                if !content.is_empty() {
                    out.push(ModelMessage::User(content));
                }
            }
            MessageRole::Assistant => {
                for step in message.parts.split(|part| matches!(part, MessagePart::StepStart)) {
                    push_assistant_step(step, &mut out);
                }
            }
        }
    }

    out
}

fn push_assistant_step(parts: &[MessagePart], out: &mut Vec<ModelMessage>) {
    let mut text = String::new();
    let mut calls = Vec::new();
    let mut results = Vec::new();

    for part in parts {
        match part {
            MessagePart::Text { text: t } => text.push_str(t),
            MessagePart::DynamicTool {
                tool_name,
                tool_call_id,
                state,
                input,
                output,
                error_text,
            } if state.is_settled() => {
                calls.push(ToolCall {
                    id: tool_call_id.clone(),
                    name: tool_name.clone(),
                    arguments: input.clone(),
                });
                let result = match (state, output, error_text) {
                    (ToolState::OutputAvailable, Some(value), _) => Ok(value.clone()),
                    (_, _, Some(error)) => Err(error.clone()),
                    _ => Ok(serde_json::Value::Null),
                };
                results.push((tool_call_id.clone(), tool_output_text(&result)));
            }
            _ => {}
        }
    }

    if text.is_empty() && calls.is_empty() {
        return;
    }
    out.push(ModelMessage::Assistant {
        text: Some(text).filter(|t| !t.is_empty()),
        tool_calls: calls,
    });
    for (tool_call_id, content) in results {
        out.push(ModelMessage::Tool {
            tool_call_id,
            content,
        });
    }
}
