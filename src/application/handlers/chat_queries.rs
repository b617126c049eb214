//! ChatQueryHandler - conversation reads and owner-only mutations.
//!
//! Reads apply the visibility rule: private conversations are visible only to
//! their owner, public ones to anyone including anonymous callers.

use std::sync::Arc;

use crate::domain::chat::{Chat, ChatMessage, Visibility};
use crate::domain::foundation::{ChatId, DomainError, ErrorCode, MessageId, UserId};
use crate::ports::ChatRepository;

/// Fails unless `viewer` may read `chat`.
pub(crate) fn ensure_readable(chat: &Chat, viewer: Option<&UserId>) -> Result<(), DomainError> {
    if chat.is_readable_by(viewer) {
        return Ok(());
    }
    match viewer {
        None => Err(DomainError::unauthorized()),
        Some(_) => Err(DomainError::forbidden()),
    }
}

fn ensure_owner(chat: &Chat, user_id: &UserId) -> Result<(), DomainError> {
    if chat.is_owned_by(user_id) {
        Ok(())
    } else {
        Err(DomainError::forbidden())
    }
}

/// Handler for conversation reads and simple mutations.
pub struct ChatQueryHandler {
    repository: Arc<dyn ChatRepository>,
}

impl ChatQueryHandler {
    pub fn new(repository: Arc<dyn ChatRepository>) -> Self {
        Self { repository }
    }

    /// The conversation, or `None` if it does not exist.
    pub async fn get_chat(
        &self,
        viewer: Option<&UserId>,
        chat_id: &ChatId,
    ) -> Result<Option<Chat>, DomainError> {
        let Some(chat) = self.repository.get_chat_by_id(chat_id).await? else {
            return Ok(None);
        };
        ensure_readable(&chat, viewer)?;
        Ok(Some(chat))
    }

    /// Messages oldest first; empty for an unknown conversation.
    pub async fn get_messages(
        &self,
        viewer: Option<&UserId>,
        chat_id: &ChatId,
    ) -> Result<Vec<ChatMessage>, DomainError> {
        if let Some(chat) = self.repository.get_chat_by_id(chat_id).await? {
            ensure_readable(&chat, viewer)?;
        }
        Ok(self.repository.list_messages(chat_id).await?)
    }

    pub async fn update_visibility(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
        visibility: Visibility,
    ) -> Result<(), DomainError> {
        let chat = self
            .repository
            .get_chat_by_id(chat_id)
            .await?
            .ok_or_else(|| DomainError::new(ErrorCode::NOT_FOUND_CHAT))?;
        ensure_owner(&chat, user_id)?;

        self.repository.update_visibility(chat_id, visibility).await?;
        tracing::info!(%chat_id, visibility = %visibility, "chat visibility updated");
        Ok(())
    }

    pub async fn get_message(
        &self,
        viewer: Option<&UserId>,
        message_id: &MessageId,
    ) -> Result<ChatMessage, DomainError> {
        let message = self
            .repository
            .get_message_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::new(ErrorCode::NOT_FOUND_CHAT))?;

        if let Some(chat) = self.repository.get_chat_by_id(&message.chat_id).await? {
            ensure_readable(&chat, viewer)?;
        }
        Ok(message)
    }

    /// Delete `anchor` and every later message of its conversation.
    pub async fn delete_trailing_messages(
        &self,
        user_id: &UserId,
        anchor: &MessageId,
    ) -> Result<u64, DomainError> {
        let message = self
            .repository
            .get_message_by_id(anchor)
            .await?
            .ok_or_else(|| DomainError::database("Message not found"))?;

        if let Some(chat) = self.repository.get_chat_by_id(&message.chat_id).await? {
            ensure_owner(&chat, user_id)?;
        }

        let deleted = self.repository.delete_trailing_messages(anchor).await?;
        tracing::info!(chat_id = %message.chat_id, %anchor, deleted, "trailing messages deleted");
        Ok(deleted)
    }
}
