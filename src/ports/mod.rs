//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the application and the outside world. Adapters implement these ports.
//!
//! - `ChatRepository` - conversations, messages, projects, stream ids
//! - `SessionValidator` - resolves session credentials to users
//! - `LanguageModel` - one streamed provider step
//! - `ToolExecutor` - runs tool calls requested by the model
//! - `ResumableStreamStore` - buffers frames for reconnecting clients

mod chat_repository;
mod language_model;
mod resumable_stream;
mod session_validator;
mod tool_executor;

pub use chat_repository::{ChatRepository, RepositoryError};
pub use language_model::{
    LanguageModel, ModelError, ModelMessage, StepEvent, StepRequest, StepStream, ToolDefinition,
    UserContent,
};
pub use resumable_stream::{
    BufferedFrame, FrameStream, ResumableStreamStore, StreamResumption, StreamStoreError,
};
pub use session_validator::SessionValidator;
pub use tool_executor::ToolExecutor;
