//! Mock language model for testing.
//!
//! Steps are scripted and consumed in order; each call to `stream_step`
//! takes the next one. When the script runs out, the fallback step is used
//! (a short text reply unless configured otherwise).
//!
//! # Example
//!
//! ```ignore
//! let model = MockLanguageModel::new()
//!     .with_text_step("Hello, I'm the assistant!")
//!     .with_event_delay(Duration::from_millis(5));
//!
//! let stream = model.stream_step(request).await?;
//! ```

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::chat::{FinishReason, TokenUsage, ToolCall};
use crate::ports::{LanguageModel, ModelError, StepEvent, StepRequest, StepStream};

/// One scripted provider step.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Stream these events.
    Events(Vec<Result<StepEvent, ModelError>>),
    /// Fail before streaming starts.
    OpenError(ModelError),
}

impl MockStep {
    /// Text split into the given deltas, then a `stop` finish.
    pub fn text<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut events: Vec<Result<StepEvent, ModelError>> = deltas
            .into_iter()
            .map(|d| Ok(StepEvent::TextDelta(d.into())))
            .collect();
        events.push(Ok(StepEvent::Finish {
            reason: FinishReason::Stop,
            usage: TokenUsage::new(10, 20),
        }));
        MockStep::Events(events)
    }

    /// A single tool call, then a `tool_calls` finish.
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        MockStep::Events(vec![
            Ok(StepEvent::ToolCall(ToolCall {
                id: id.into(),
                name: name.into(),
                arguments,
            })),
            Ok(StepEvent::Finish {
                reason: FinishReason::ToolCalls,
                usage: TokenUsage::new(5, 5),
            }),
        ])
    }
}

/// Mock language model for testing.
#[derive(Debug, Clone)]
pub struct MockLanguageModel {
    steps: Arc<Mutex<VecDeque<MockStep>>>,
    fallback: MockStep,
    event_delay: Duration,
    calls: Arc<Mutex<Vec<StepRequest>>>,
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self {
            steps: Arc::new(Mutex::new(VecDeque::new())),
            fallback: MockStep::text(["Mock ", "response"]),
            event_delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a scripted step.
    pub fn with_step(self, step: MockStep) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    /// Queue a text reply split on word boundaries.
    pub fn with_text_step(self, text: &str) -> Self {
        let deltas: Vec<String> = text.split_inclusive(' ').map(str::to_string).collect();
        self.with_step(MockStep::text(deltas))
    }

    /// Queue a failure before streaming.
    pub fn with_open_error(self, error: ModelError) -> Self {
        self.with_step(MockStep::OpenError(error))
    }

    /// Step used once the script is exhausted.
    pub fn with_fallback(mut self, step: MockStep) -> Self {
        self.fallback = step;
        self
    }

    /// Pause before every streamed event.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn get_calls(&self) -> Vec<StepRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn next_step(&self) -> MockStep {
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn stream_step(&self, request: StepRequest) -> Result<StepStream, ModelError> {
        self.calls.lock().unwrap().push(request);

        let events = match self.next_step() {
            MockStep::OpenError(error) => return Err(error),
            MockStep::Events(events) => events,
        };

        let delay = self.event_delay;
        let stream = stream::iter(events).then(move |event| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            event
        });

        Ok(Box::pin(stream))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
