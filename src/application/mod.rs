//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! The streaming command runs the model; queries and small mutations go
//! straight through the repository.

pub mod handlers;

pub use handlers::{
    ChatQueryHandler, ChatStream, ResumeOutcome, ResumeStreamHandler, ResumeStreamQuery,
    StreamChatCommand, StreamChatHandler, StreamChatSettings,
};
