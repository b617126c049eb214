//! Chat messages and their typed content parts.
//!
//! A message is an ordered list of parts. Parts are tagged by `type` on the
//! wire; unknown part types fail deserialization so they never reach storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{ChatId, MessageId, Timestamp, ValidationError};

/// Longest text part accepted from a user.
pub const MAX_TEXT_PART_CHARS: usize = 2000;

/// Image types a user may attach.
pub const ACCEPTED_IMAGE_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            other => Err(ValidationError::invalid_format(
                "role",
                format!("unknown role '{}'", other),
            )),
        }
    }
}

/// Lifecycle of a tool invocation inside a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputError,
}

impl ToolState {
    /// True once the tool has produced an output or an error.
    pub fn is_settled(&self) -> bool {
        matches!(self, ToolState::OutputAvailable | ToolState::OutputError)
    }
}

/// Typed content of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum MessagePart {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    StepStart,
    File {
        media_type: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    DynamicTool {
        tool_name: String,
        tool_call_id: String,
        state: ToolState,
        #[serde(default)]
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_text: Option<String>,
    },
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text { text: text.into() }
    }

    /// Text carried by a `text` part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePart::Text { text } => Some(text),
            _ => None,
        }
    }

    fn validate_user_part(&self, index: usize) -> Result<(), ValidationError> {
        match self {
            MessagePart::Text { text } => {
                let chars = text.chars().count();
                if chars == 0 {
                    return Err(ValidationError::empty_field(format!("parts[{}].text", index)));
                }
                if chars > MAX_TEXT_PART_CHARS {
                    return Err(ValidationError::too_long(
                        format!("parts[{}].text", index),
                        MAX_TEXT_PART_CHARS,
                        chars,
                    ));
                }
                Ok(())
            }
            MessagePart::File { media_type, url, .. } => {
                if !ACCEPTED_IMAGE_TYPES.contains(&media_type.as_str()) {
                    return Err(ValidationError::invalid_format(
                        format!("parts[{}].mediaType", index),
                        format!("unsupported media type '{}'", media_type),
                    ));
                }
                if url.trim().is_empty() {
                    return Err(ValidationError::empty_field(format!("parts[{}].url", index)));
                }
                Ok(())
            }
            _ => Err(ValidationError::invalid_format(
                format!("parts[{}]", index),
                "user messages may only contain text and file parts",
            )),
        }
    }
}

/// Validates the parts of an inbound user message.
pub fn validate_user_parts(parts: &[MessagePart]) -> Result<(), ValidationError> {
    if parts.is_empty() {
        return Err(ValidationError::empty_field("parts"));
    }
    parts
        .iter()
        .enumerate()
        .try_for_each(|(index, part)| part.validate_user_part(index))
}

/// File attached to a message outside its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub content_type: String,
}

/// One persisted turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: Timestamp,
}

impl ChatMessage {
    /// A user message stamped now, without attachments.
    pub fn user(id: MessageId, chat_id: ChatId, parts: Vec<MessagePart>) -> Self {
        Self {
            id,
            chat_id,
            role: MessageRole::User,
            parts,
            attachments: Vec::new(),
            created_at: Timestamp::now(),
        }
    }

    /// An assistant message stamped at `created_at`.
    pub fn assistant(
        id: MessageId,
        chat_id: ChatId,
        parts: Vec<MessagePart>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            chat_id,
            role: MessageRole::Assistant,
            parts,
            attachments: Vec::new(),
            created_at,
        }
    }

    /// Concatenated text of all `text` parts.
    pub fn text_content(&self) -> String {
        self.parts.iter().filter_map(MessagePart::as_text).collect()
    }
}
