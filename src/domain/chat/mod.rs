//! Chat domain - conversations, messages and the UI stream protocol.

mod conversation;
mod message;
mod model_event;
mod stream_event;
mod usage;

pub use conversation::{Chat, Project, StreamRegistration, Visibility, UNTITLED};
pub use message::{
    validate_user_parts, Attachment, ChatMessage, MessagePart, MessageRole, ToolState,
    ACCEPTED_IMAGE_TYPES, MAX_TEXT_PART_CHARS,
};
pub use model_event::{FinishReason, ModelEvent, ToolCall};
pub use stream_event::{MessageAssembler, UiStreamEvent, STREAM_ERROR_TEXT};
pub use usage::TokenUsage;
