//! Token usage reported by the model provider.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Token counts for one step or a whole invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub reasoning_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            reasoning_tokens: 0,
        }
    }

    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.reasoning_tokens += rhs.reasoning_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates_across_steps() {
        let mut total = TokenUsage::default();
        total += TokenUsage::new(10, 5);
        total += TokenUsage {
            input_tokens: 20,
            output_tokens: 7,
            reasoning_tokens: 3,
        };

        assert_eq!(total.input_tokens, 30);
        assert_eq!(total.output_tokens, 12);
        assert_eq!(total.reasoning_tokens, 3);
        assert_eq!(total.total_tokens(), 42);
    }

    #[test]
    fn usage_serializes_camel_case() {
        let json = serde_json::to_value(TokenUsage::new(1, 2)).unwrap();
        assert_eq!(json["inputTokens"], 1);
        assert_eq!(json["outputTokens"], 2);
    }
}
