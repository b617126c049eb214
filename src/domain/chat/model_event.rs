//! Events produced by a model invocation.

use serde_json::Value;

use super::TokenUsage;

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Why a provider step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other,
}

impl FinishReason {
    /// Maps the provider's `finish_reason` string.
    pub fn from_provider(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" | "function_call" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            "error" => FinishReason::Error,
            _ => FinishReason::Other,
        }
    }
}

/// One event of the lazy output sequence of a model invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    StepStart,
    TextDelta(String),
    ReasoningDelta(String),
    ToolCall(ToolCall),
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: Result<Value, String>,
    },
    StepFinish {
        reason: FinishReason,
        usage: TokenUsage,
    },
    /// Terminal event with usage aggregated over all steps.
    Finish {
        reason: FinishReason,
        usage: TokenUsage,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_maps_provider_strings() {
        assert_eq!(FinishReason::from_provider("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_provider("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from_provider("length"), FinishReason::Length);
        assert_eq!(FinishReason::from_provider("whatever"), FinishReason::Other);
    }
}
