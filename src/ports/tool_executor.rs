//! Tool executor port - runs tool calls requested by the model.

use async_trait::async_trait;
use serde_json::Value;

use super::ToolDefinition;
use crate::domain::chat::ToolCall;

/// Port for executing model tool calls.
///
/// A failed tool is not an invocation failure: the error text is fed back
/// to the model as the tool's output.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tools offered to the model on every step.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute one call, returning its JSON output or an error message.
    async fn execute(&self, call: &ToolCall) -> Result<Value, String>;
}
