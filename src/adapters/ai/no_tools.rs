//! Tool executor that offers no tools.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::chat::ToolCall;
use crate::ports::{ToolDefinition, ToolExecutor};

/// Offers no tools; any call the model makes anyway is answered with an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTools;

#[async_trait]
impl ToolExecutor for NoTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, String> {
        tracing::warn!(tool = %call.name, "model called an unknown tool");
        Err(format!("unknown tool: {}", call.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unknown_tools_fail() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "weather".into(),
            arguments: json!({}),
        };
        assert!(NoTools.definitions().is_empty());
        assert_eq!(NoTools.execute(&call).await, Err("unknown tool: weather".to_string()));
    }
}
