//! HTTP DTOs for chat endpoints.
//!
//! Request bodies are decoded by hand from raw bytes so that a malformed body
//! is reported as `bad_request:api` before the session is checked.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::application::handlers::StreamChatCommand;
use crate::domain::chat::{validate_user_parts, MessagePart, MessageRole, Visibility};
use crate::domain::foundation::{ChatId, DomainError, MessageId, ValidationError};

/// Decode a JSON body, mapping any failure to `bad_request:api`.
pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, DomainError> {
    serde_json::from_slice(body).map_err(|e| DomainError::bad_request(e.to_string()))
}

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostChatRequest {
    /// Conversation id, chosen by the client.
    pub id: String,
    pub message: InboundMessage,
    pub selected_chat_model: String,
    pub selected_visibility_type: Visibility,
}

/// The user message inside [`PostChatRequest`].
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
}

impl PostChatRequest {
    /// Validate into a command for the stream handler.
    pub fn into_command(self) -> Result<StreamChatCommand, DomainError> {
        let chat_id = ChatId::new(self.id)?;
        let message_id = MessageId::new(self.message.id)?;

        if self.message.role != MessageRole::User {
            return Err(ValidationError::invalid_format("message.role", "must be \"user\"").into());
        }
        validate_user_parts(&self.message.parts)?;

        if self.selected_chat_model.trim().is_empty() {
            return Err(ValidationError::empty_field("selectedChatModel").into());
        }

        Ok(StreamChatCommand {
            chat_id,
            message_id,
            parts: self.message.parts,
            selected_chat_model: self.selected_chat_model,
            visibility: self.selected_visibility_type,
        })
    }
}

/// Body of `PATCH /api/chat/:id/visibility`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateVisibilityRequest {
    pub visibility: Visibility,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// `{ "success": true }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;
    use serde_json::json;

    fn body(overrides: impl FnOnce(&mut serde_json::Value)) -> Vec<u8> {
        let mut value = json!({
            "id": "c1",
            "message": {
                "id": "m1",
                "role": "user",
                "parts": [{ "type": "text", "text": "hello" }]
            },
            "selectedChatModel": "chat-model",
            "selectedVisibilityType": "private"
        });
        overrides(&mut value);
        serde_json::to_vec(&value).unwrap()
    }

    fn command(bytes: &[u8]) -> Result<StreamChatCommand, DomainError> {
        decode_json::<PostChatRequest>(bytes)?.into_command()
    }

    #[test]
    fn valid_body_becomes_command() {
        let cmd = command(&body(|_| {})).unwrap();
        assert_eq!(cmd.chat_id.as_str(), "c1");
        assert_eq!(cmd.message_id.as_str(), "m1");
        assert_eq!(cmd.visibility, Visibility::Private);
        assert_eq!(cmd.parts, vec![MessagePart::text("hello")]);
    }

    #[test]
    fn malformed_json_is_bad_request_api() {
        let err = command(b"{not json").unwrap_err();
        assert_eq!(err.code, ErrorCode::BAD_REQUEST_API);
    }

    #[test]
    fn unknown_visibility_is_rejected() {
        let err = command(&body(|v| v["selectedVisibilityType"] = json!("shared"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::BAD_REQUEST_API);
    }

    #[test]
    fn assistant_role_is_rejected() {
        let err = command(&body(|v| v["message"]["role"] = json!("assistant"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::BAD_REQUEST_API);
    }

    #[test]
    fn empty_parts_are_rejected() {
        let err = command(&body(|v| v["message"]["parts"] = json!([]))).unwrap_err();
        assert_eq!(err.code, ErrorCode::BAD_REQUEST_API);
    }

    #[test]
    fn empty_ids_and_model_are_rejected() {
        assert!(command(&body(|v| v["id"] = json!(""))).is_err());
        assert!(command(&body(|v| v["message"]["id"] = json!(""))).is_err());
        assert!(command(&body(|v| v["selectedChatModel"] = json!(" "))).is_err());
    }

    #[test]
    fn overlong_text_is_rejected() {
        let long = "x".repeat(2001);
        let err = command(&body(|v| v["message"]["parts"][0]["text"] = json!(long))).unwrap_err();
        assert_eq!(err.code, ErrorCode::BAD_REQUEST_API);
    }

    #[test]
    fn success_response_serializes() {
        let json = serde_json::to_string(&SuccessResponse::ok()).unwrap();
        assert_eq!(json, r#"{"success":true}"#);
    }
}
