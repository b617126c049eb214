//! HTTP adapter for chat endpoints.
//!
//! - `POST /api/chat` - Send a message and stream the reply (SSE)
//! - `GET /api/chat/:id` - Get a conversation or `null`
//! - `GET /api/chat/:id/messages` - List messages
//! - `PATCH /api/chat/:id/visibility` - Change visibility
//! - `GET /api/chat/:id/stream` - Resume the latest stream (SSE)
//! - `GET /api/message/:id` - Get a message
//! - `DELETE /api/message/:id/trailing` - Delete a message and its successors

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::ChatAppState;
pub use routes::chat_router;
