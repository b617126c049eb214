//! ResumeStreamHandler - reattaches a client to the latest stream of a chat.

use std::sync::Arc;

use crate::domain::chat::{ChatMessage, MessageRole};
use crate::domain::foundation::{ChatId, DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{ChatRepository, FrameStream, StreamResumption};

use super::chat_queries::ensure_readable;

/// How recent a persisted reply must be to stand in for an expired stream.
pub const RECENT_REPLY_SECS: i64 = 15;

/// Query to resume the latest stream of a conversation.
#[derive(Debug, Clone)]
pub struct ResumeStreamQuery {
    pub chat_id: ChatId,
    /// Last sequence number the client received.
    pub last_event_id: Option<u64>,
}

/// What the client gets back.
pub enum ResumeOutcome {
    /// Buffered frames after the cursor, then live frames until the end.
    Frames(FrameStream),
    /// The stream is gone but its reply was persisted moments ago.
    AppendMessage(ChatMessage),
    /// Nothing to resume.
    NoContent,
}

impl std::fmt::Debug for ResumeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResumeOutcome::Frames(_) => f.write_str("Frames(..)"),
            ResumeOutcome::AppendMessage(message) => {
                f.debug_tuple("AppendMessage").field(&message.id).finish()
            }
            ResumeOutcome::NoContent => f.write_str("NoContent"),
        }
    }
}

/// Handler for stream resumption.
pub struct ResumeStreamHandler {
    repository: Arc<dyn ChatRepository>,
    resumption: StreamResumption,
}

impl ResumeStreamHandler {
    pub fn new(repository: Arc<dyn ChatRepository>, resumption: StreamResumption) -> Self {
        Self {
            repository,
            resumption,
        }
    }

    pub async fn handle(
        &self,
        viewer: Option<&UserId>,
        query: ResumeStreamQuery,
    ) -> Result<ResumeOutcome, DomainError> {
        let Some(store) = self.resumption.store() else {
            return Ok(ResumeOutcome::NoContent);
        };

        let chat = self
            .repository
            .get_chat_by_id(&query.chat_id)
            .await?
            .ok_or_else(|| DomainError::new(ErrorCode::NOT_FOUND_CHAT))?;
        ensure_readable(&chat, viewer)?;

        let stream_ids = self.repository.list_stream_ids(&query.chat_id).await?;
        let stream_id = *stream_ids
            .last()
            .ok_or_else(|| DomainError::new(ErrorCode::NOT_FOUND_STREAM))?;

        match store.resume(stream_id, query.last_event_id).await {
            Ok(Some(frames)) => {
                tracing::debug!(%stream_id, after = ?query.last_event_id, "resuming buffered stream");
                return Ok(ResumeOutcome::Frames(frames));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%stream_id, error = %e, "stream store unavailable; falling back");
            }
        }

        let messages = self.repository.list_messages(&query.chat_id).await?;
        let now = Timestamp::now();
        match messages.into_iter().last() {
            Some(message)
                if message.role == MessageRole::Assistant
                    && now.duration_since(&message.created_at)
                        <= chrono::Duration::seconds(RECENT_REPLY_SECS) =>
            {
                Ok(ResumeOutcome::AppendMessage(message))
            }
            _ => Ok(ResumeOutcome::NoContent),
        }
    }
}
