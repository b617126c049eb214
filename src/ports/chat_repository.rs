//! Chat repository port.
//!
//! Persistence contract for conversations, messages, projects and stream
//! registrations. Each method is a single store transaction.
//!
//! Failures are reported as [`RepositoryError`] and converted once into a
//! `bad_request:database` [`DomainError`] carrying only the operation name;
//! driver detail is logged by the adapter and never leaves the process.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::chat::{Chat, ChatMessage, Project, StreamRegistration, TokenUsage, Visibility};
use crate::domain::foundation::{ChatId, DomainError, MessageId, StreamId, Timestamp, UserId};

/// Persistence failure.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The store rejected or failed the operation.
    #[error("{operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A referenced record does not exist.
    #[error("{0}")]
    NotFound(&'static str),
}

impl RepositoryError {
    pub fn database(
        operation: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        RepositoryError::Database {
            operation,
            source: source.into(),
        }
    }

    /// Operation-level description safe to attach as a cause.
    pub fn operation(&self) -> &'static str {
        match self {
            RepositoryError::Database { operation, .. } => operation,
            RepositoryError::NotFound(what) => what,
        }
    }
}

impl From<RepositoryError> for DomainError {
    fn from(err: RepositoryError) -> Self {
        DomainError::database(err.operation())
    }
}

/// Repository port for chat persistence.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Insert the grouping record for a user's conversations.
    async fn create_project(&self, project: &Project) -> Result<(), RepositoryError>;

    /// Insert a conversation.
    ///
    /// # Errors
    ///
    /// - `Database` on duplicate id or missing project
    async fn create_chat(&self, chat: &Chat) -> Result<(), RepositoryError>;

    /// Returns `None` if not found.
    async fn get_chat_by_id(&self, id: &ChatId) -> Result<Option<Chat>, RepositoryError>;

    /// Messages of a conversation, oldest first.
    async fn list_messages(&self, chat_id: &ChatId) -> Result<Vec<ChatMessage>, RepositoryError>;

    /// Insert messages atomically.
    ///
    /// # Errors
    ///
    /// - `Database` if any message references an unknown conversation or
    ///   reuses an existing id; nothing is written in that case
    async fn append_messages(&self, messages: &[ChatMessage]) -> Result<(), RepositoryError>;

    /// Set a conversation's visibility. Idempotent.
    async fn update_visibility(
        &self,
        chat_id: &ChatId,
        visibility: Visibility,
    ) -> Result<(), RepositoryError>;

    /// Returns `None` if not found.
    async fn get_message_by_id(
        &self,
        id: &MessageId,
    ) -> Result<Option<ChatMessage>, RepositoryError>;

    /// Delete the anchor message and every later message of its conversation.
    ///
    /// Returns the number of deleted messages.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the anchor does not exist; nothing is deleted
    async fn delete_trailing_messages(&self, anchor: &MessageId) -> Result<u64, RepositoryError>;

    /// Record a stream started for a conversation.
    async fn register_stream_id(
        &self,
        registration: &StreamRegistration,
    ) -> Result<(), RepositoryError>;

    /// Stream ids of a conversation, oldest first.
    async fn list_stream_ids(&self, chat_id: &ChatId) -> Result<Vec<StreamId>, RepositoryError>;

    /// Store the usage snapshot of the last completed stream.
    async fn update_last_context(
        &self,
        chat_id: &ChatId,
        usage: &TokenUsage,
    ) -> Result<(), RepositoryError>;

    /// Number of user messages `user_id` sent in their conversations since `since`.
    async fn count_user_messages_since(
        &self,
        user_id: &UserId,
        since: Timestamp,
    ) -> Result<u64, RepositoryError>;
}
