//! Axum router configuration for chat endpoints.

use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use super::handlers::{
    delete_trailing_messages, get_chat, get_message, get_messages, post_chat, resume_stream,
    update_visibility, ChatAppState,
};

/// Conversation routes.
///
/// # Routes
/// - `POST /` - Send a user message, stream the reply
/// - `GET /:id` - Get a conversation
/// - `GET /:id/messages` - List its messages
/// - `PATCH /:id/visibility` - Change its visibility (owner only)
/// - `GET /:id/stream` - Resume its latest stream
pub fn chat_routes() -> Router<ChatAppState> {
    Router::new()
        .route("/", post(post_chat))
        .route("/:id", get(get_chat))
        .route("/:id/messages", get(get_messages))
        .route("/:id/visibility", patch(update_visibility))
        .route("/:id/stream", get(resume_stream))
}

/// Message routes.
///
/// # Routes
/// - `GET /:id` - Get a message
/// - `DELETE /:id/trailing` - Delete it and every later message (owner only)
pub fn message_routes() -> Router<ChatAppState> {
    Router::new()
        .route("/:id", get(get_message))
        .route("/:id/trailing", delete(delete_trailing_messages))
}

/// Chat module router, suitable for mounting at `/api`.
pub fn chat_router() -> Router<ChatAppState> {
    Router::new()
        .nest("/chat", chat_routes())
        .nest("/message", message_routes())
}
