//! In-memory chat repository.
//!
//! Enforces the same referential rules as the PostgreSQL schema: messages
//! and streams need an existing conversation, conversations need an existing
//! project, and ids are unique.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::chat::{
    Chat, ChatMessage, MessageRole, Project, StreamRegistration, TokenUsage, Visibility,
};
use crate::domain::foundation::{ChatId, MessageId, ProjectId, StreamId, Timestamp, UserId};
use crate::ports::{ChatRepository, RepositoryError};

#[derive(Debug, Default)]
struct Store {
    projects: HashMap<ProjectId, Project>,
    chats: HashMap<ChatId, Chat>,
    /// Insertion order; reads sort by creation time.
    messages: Vec<ChatMessage>,
    streams: Vec<StreamRegistration>,
}

/// In-memory chat repository for testing and development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChatRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations.
    pub async fn chat_count(&self) -> usize {
        self.store.read().await.chats.len()
    }

    /// Number of stored messages across all conversations.
    pub async fn message_count(&self) -> usize {
        self.store.read().await.messages.len()
    }
}

fn constraint(operation: &'static str, detail: &str) -> RepositoryError {
    tracing::error!(detail, operation, "in-memory constraint violated");
    RepositoryError::database(operation, detail.to_string())
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn create_project(&self, project: &Project) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        if store.projects.contains_key(&project.id) {
            return Err(constraint("Failed to create project", "duplicate project id"));
        }
        store.projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn create_chat(&self, chat: &Chat) -> Result<(), RepositoryError> {
        const OPERATION: &str = "Failed to save chat";

        let mut store = self.store.write().await;
        if store.chats.contains_key(&chat.id) {
            return Err(constraint(OPERATION, "duplicate chat id"));
        }
        if !store.projects.contains_key(&chat.project_id) {
            return Err(constraint(OPERATION, "unknown project"));
        }
        store.chats.insert(chat.id.clone(), chat.clone());
        Ok(())
    }

    async fn get_chat_by_id(&self, id: &ChatId) -> Result<Option<Chat>, RepositoryError> {
        Ok(self.store.read().await.chats.get(id).cloned())
    }

    async fn list_messages(&self, chat_id: &ChatId) -> Result<Vec<ChatMessage>, RepositoryError> {
        let store = self.store.read().await;
        let mut messages: Vec<ChatMessage> = store
            .messages
            .iter()
            .filter(|m| &m.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn append_messages(&self, messages: &[ChatMessage]) -> Result<(), RepositoryError> {
        const OPERATION: &str = "Failed to save messages";

        let mut store = self.store.write().await;

        for (index, message) in messages.iter().enumerate() {
            if !store.chats.contains_key(&message.chat_id) {
                return Err(constraint(OPERATION, "unknown chat"));
            }
            let duplicate = store.messages.iter().any(|m| m.id == message.id)
                || messages[..index].iter().any(|m| m.id == message.id);
            if duplicate {
                return Err(constraint(OPERATION, "duplicate message id"));
            }
        }

        store.messages.extend_from_slice(messages);
        Ok(())
    }

    async fn update_visibility(
        &self,
        chat_id: &ChatId,
        visibility: Visibility,
    ) -> Result<(), RepositoryError> {
        if let Some(chat) = self.store.write().await.chats.get_mut(chat_id) {
            chat.visibility = visibility;
        }
        Ok(())
    }

    async fn get_message_by_id(
        &self,
        id: &MessageId,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.messages.iter().find(|m| &m.id == id).cloned())
    }

    async fn delete_trailing_messages(&self, anchor: &MessageId) -> Result<u64, RepositoryError> {
        let mut store = self.store.write().await;

        let Some((chat_id, cutoff)) = store
            .messages
            .iter()
            .find(|m| &m.id == anchor)
            .map(|m| (m.chat_id.clone(), m.created_at))
        else {
            return Err(RepositoryError::NotFound("Message not found"));
        };

        let before = store.messages.len();
        store
            .messages
            .retain(|m| m.chat_id != chat_id || m.created_at < cutoff);
        Ok((before - store.messages.len()) as u64)
    }

    async fn register_stream_id(
        &self,
        registration: &StreamRegistration,
    ) -> Result<(), RepositoryError> {
        const OPERATION: &str = "Failed to create stream id";

        let mut store = self.store.write().await;
        if !store.chats.contains_key(&registration.chat_id) {
            return Err(constraint(OPERATION, "unknown chat"));
        }
        if store
            .streams
            .iter()
            .any(|s| s.stream_id == registration.stream_id)
        {
            return Err(constraint(OPERATION, "duplicate stream id"));
        }
        store.streams.push(registration.clone());
        Ok(())
    }

    async fn list_stream_ids(&self, chat_id: &ChatId) -> Result<Vec<StreamId>, RepositoryError> {
        let store = self.store.read().await;
        let mut streams: Vec<&StreamRegistration> = store
            .streams
            .iter()
            .filter(|s| &s.chat_id == chat_id)
            .collect();
        streams.sort_by_key(|s| s.created_at);
        Ok(streams.into_iter().map(|s| s.stream_id).collect())
    }

    async fn update_last_context(
        &self,
        chat_id: &ChatId,
        usage: &TokenUsage,
    ) -> Result<(), RepositoryError> {
        if let Some(chat) = self.store.write().await.chats.get_mut(chat_id) {
            chat.last_context = Some(*usage);
        }
        Ok(())
    }

    async fn count_user_messages_since(
        &self,
        user_id: &UserId,
        since: Timestamp,
    ) -> Result<u64, RepositoryError> {
        let store = self.store.read().await;
        let count = store
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::User && m.created_at >= since)
            .filter(|m| {
                store
                    .chats
                    .get(&m.chat_id)
                    .map_or(false, |chat| &chat.user_id == user_id)
            })
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chat::MessagePart;

    fn user() -> UserId {
        UserId::new("u1").unwrap()
    }

    async fn repo_with_chat(id: &str) -> (InMemoryChatRepository, ChatId) {
        let repo = InMemoryChatRepository::new();
        let project = Project::untitled(user());
        repo.create_project(&project).await.unwrap();
        let chat_id = ChatId::new(id).unwrap();
        repo.create_chat(&Chat::untitled(chat_id.clone(), user(), Visibility::Private, project.id))
            .await
            .unwrap();
        (repo, chat_id)
    }

    fn messages(chat_id: &ChatId, count: usize) -> Vec<ChatMessage> {
        let mut out: Vec<ChatMessage> = Vec::with_capacity(count);
        for i in 0..count {
            let mut message = ChatMessage::user(
                MessageId::new(format!("m{}", i + 1)).unwrap(),
                chat_id.clone(),
                vec![MessagePart::text(format!("message {}", i + 1))],
            );
            if let Some(previous) = out.last() {
                message.created_at = Timestamp::now_after(&previous.created_at);
            }
            out.push(message);
        }
        out
    }

    #[tokio::test]
    async fn create_chat_requires_existing_project() {
        let repo = InMemoryChatRepository::new();
        let chat = Chat::untitled(ChatId::new("c1").unwrap(), user(), Visibility::Private, ProjectId::new());

        let err = repo.create_chat(&chat).await.unwrap_err();
        assert_eq!(err.operation(), "Failed to save chat");
        assert_eq!(repo.chat_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_chat_id_is_rejected() {
        let (repo, chat_id) = repo_with_chat("c1").await;
        let existing = repo.get_chat_by_id(&chat_id).await.unwrap().unwrap();

        assert!(repo.create_chat(&existing).await.is_err());
        assert_eq!(repo.chat_count().await, 1);
    }

    #[tokio::test]
    async fn messages_are_listed_in_creation_order() {
        let (repo, chat_id) = repo_with_chat("c1").await;
        let mut batch = messages(&chat_id, 3);
        batch.reverse();
        repo.append_messages(&batch).await.unwrap();

        let listed = repo.list_messages(&chat_id).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn append_is_atomic() {
        let (repo, chat_id) = repo_with_chat("c1").await;
        let mut batch = messages(&chat_id, 2);
        batch[1].chat_id = ChatId::new("missing").unwrap();

        assert!(repo.append_messages(&batch).await.is_err());
        assert_eq!(repo.message_count().await, 0);

        let mut batch = messages(&chat_id, 2);
        batch[1].id = batch[0].id.clone();
        assert!(repo.append_messages(&batch).await.is_err());
        assert_eq!(repo.message_count().await, 0);
    }

    #[tokio::test]
    async fn trailing_delete_removes_anchor_and_later_messages() {
        let (repo, chat_id) = repo_with_chat("c1").await;
        repo.append_messages(&messages(&chat_id, 3)).await.unwrap();

        let deleted = repo
            .delete_trailing_messages(&MessageId::new("m2").unwrap())
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        let remaining = repo.list_messages(&chat_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id.as_str(), "m1");
    }

    #[tokio::test]
    async fn trailing_delete_of_unknown_anchor_deletes_nothing() {
        let (repo, chat_id) = repo_with_chat("c1").await;
        repo.append_messages(&messages(&chat_id, 3)).await.unwrap();

        let err = repo
            .delete_trailing_messages(&MessageId::new("nope").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::NotFound("Message not found")));
        assert_eq!(repo.message_count().await, 3);
    }

    #[tokio::test]
    async fn visibility_update_is_idempotent() {
        let (repo, chat_id) = repo_with_chat("c1").await;

        repo.update_visibility(&chat_id, Visibility::Public).await.unwrap();
        repo.update_visibility(&chat_id, Visibility::Public).await.unwrap();

        let chat = repo.get_chat_by_id(&chat_id).await.unwrap().unwrap();
        assert_eq!(chat.visibility, Visibility::Public);
    }

    #[tokio::test]
    async fn stream_ids_require_a_chat_and_list_oldest_first() {
        let (repo, chat_id) = repo_with_chat("c1").await;

        let orphan = StreamRegistration::new(ChatId::new("missing").unwrap());
        assert!(repo.register_stream_id(&orphan).await.is_err());

        let first = StreamRegistration::new(chat_id.clone());
        let mut second = StreamRegistration::new(chat_id.clone());
        second.created_at = Timestamp::now_after(&first.created_at);
        repo.register_stream_id(&second).await.unwrap();
        repo.register_stream_id(&first).await.unwrap();

        let ids = repo.list_stream_ids(&chat_id).await.unwrap();
        assert_eq!(ids, vec![first.stream_id, second.stream_id]);
    }

    #[tokio::test]
    async fn last_context_is_stored_on_the_chat() {
        let (repo, chat_id) = repo_with_chat("c1").await;
        repo.update_last_context(&chat_id, &TokenUsage::new(12, 34)).await.unwrap();

        let chat = repo.get_chat_by_id(&chat_id).await.unwrap().unwrap();
        assert_eq!(chat.last_context, Some(TokenUsage::new(12, 34)));
    }

    #[tokio::test]
    async fn user_message_count_only_includes_own_user_messages() {
        let (repo, chat_id) = repo_with_chat("c1").await;
        let mut batch = messages(&chat_id, 2);
        batch[1].role = MessageRole::Assistant;
        repo.append_messages(&batch).await.unwrap();

        let since = Timestamp::now().minus_hours(24);
        assert_eq!(repo.count_user_messages_since(&user(), since).await.unwrap(), 1);
        assert_eq!(
            repo.count_user_messages_since(&UserId::new("u2").unwrap(), since)
                .await
                .unwrap(),
            0
        );
    }
}
