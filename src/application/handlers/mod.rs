//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

mod chat_queries;
mod chat_stream;
mod resume_stream;

pub use chat_queries::ChatQueryHandler;
pub use chat_stream::{
    ChatStream, StreamChatCommand, StreamChatHandler, StreamChatSettings,
};
pub use resume_stream::{
    ResumeOutcome, ResumeStreamHandler, ResumeStreamQuery, RECENT_REPLY_SECS,
};
