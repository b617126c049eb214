//! PostgreSQL implementation of ChatRepository.
//!
//! Table and column names follow the schema shared with the web client
//! (`"Chat"`, `"Message_v2"`, `"Stream"`, `projects`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::chat::{
    Attachment, Chat, ChatMessage, MessagePart, MessageRole, Project, StreamRegistration,
    TokenUsage, Visibility,
};
use crate::domain::foundation::{
    ChatId, MessageId, ProjectId, StreamId, Timestamp, UserId,
};
use crate::ports::{ChatRepository, RepositoryError};

/// PostgreSQL implementation of ChatRepository.
#[derive(Clone)]
pub struct PostgresChatRepository {
    pool: PgPool,
}

impl PostgresChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Logs the driver error and wraps it with an operation-level description.
fn db_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> RepositoryError {
    move |e| {
        tracing::error!(error = %e, operation, "database operation failed");
        RepositoryError::database(operation, e)
    }
}

fn corrupt(operation: &'static str, detail: String) -> RepositoryError {
    tracing::error!(detail = %detail, operation, "unreadable row");
    RepositoryError::database(operation, detail)
}

fn row_to_chat(row: &PgRow, operation: &'static str) -> Result<Chat, RepositoryError> {
    let id: String = row.get("id");
    let user_id: String = row.get("userId");
    let visibility: &str = row.get("visibility");
    let project_id: Uuid = row.get("projectId");
    let created_at: DateTime<Utc> = row.get("createdAt");
    let last_context: Option<Json<TokenUsage>> = row.get("lastContext");

    Ok(Chat {
        id: ChatId::new(id).map_err(|e| corrupt(operation, e.to_string()))?,
        created_at: Timestamp::from_datetime(created_at),
        title: row.get("title"),
        user_id: UserId::new(user_id).map_err(|e| corrupt(operation, e.to_string()))?,
        visibility: visibility
            .parse::<Visibility>()
            .map_err(|e| corrupt(operation, e.to_string()))?,
        project_id: ProjectId::from_uuid(project_id),
        last_context: last_context.map(|Json(usage)| usage),
    })
}

fn row_to_message(row: &PgRow, operation: &'static str) -> Result<ChatMessage, RepositoryError> {
    let id: String = row.get("id");
    let chat_id: String = row.get("chatId");
    let role: &str = row.get("role");
    let parts: Json<Vec<MessagePart>> = row
        .try_get("parts")
        .map_err(|e| corrupt(operation, e.to_string()))?;
    let attachments: Json<Vec<Attachment>> = row
        .try_get("attachments")
        .map_err(|e| corrupt(operation, e.to_string()))?;
    let created_at: DateTime<Utc> = row.get("createdAt");

    Ok(ChatMessage {
        id: MessageId::new(id).map_err(|e| corrupt(operation, e.to_string()))?,
        chat_id: ChatId::new(chat_id).map_err(|e| corrupt(operation, e.to_string()))?,
        role: role
            .parse::<MessageRole>()
            .map_err(|e| corrupt(operation, e.to_string()))?,
        parts: parts.0,
        attachments: attachments.0,
        created_at: Timestamp::from_datetime(created_at),
    })
}

#[async_trait]
impl ChatRepository for PostgresChatRepository {
    async fn create_project(&self, project: &Project) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, user_id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(project.id.as_uuid())
        .bind(project.user_id.as_str())
        .bind(&project.name)
        .bind(project.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create project"))?;

        Ok(())
    }

    async fn create_chat(&self, chat: &Chat) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO "Chat" ("id", "createdAt", "title", "userId", "visibility", "projectId", "lastContext")
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(chat.id.as_str())
        .bind(chat.created_at.as_datetime())
        .bind(&chat.title)
        .bind(chat.user_id.as_str())
        .bind(chat.visibility.as_str())
        .bind(chat.project_id.as_uuid())
        .bind(chat.last_context.map(Json))
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to save chat"))?;

        Ok(())
    }

    async fn get_chat_by_id(&self, id: &ChatId) -> Result<Option<Chat>, RepositoryError> {
        const OPERATION: &str = "Failed to get chat by id";

        let row = sqlx::query(
            r#"
            SELECT "id", "createdAt", "title", "userId", "visibility", "projectId", "lastContext"
            FROM "Chat"
            WHERE "id" = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error(OPERATION))?;

        row.map(|row| row_to_chat(&row, OPERATION)).transpose()
    }

    async fn list_messages(&self, chat_id: &ChatId) -> Result<Vec<ChatMessage>, RepositoryError> {
        const OPERATION: &str = "Failed to get messages by chat id";

        let rows = sqlx::query(
            r#"
            SELECT "id", "chatId", "role", "parts", "attachments", "createdAt"
            FROM "Message_v2"
            WHERE "chatId" = $1
            ORDER BY "createdAt" ASC
            "#,
        )
        .bind(chat_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error(OPERATION))?;

        rows.iter().map(|row| row_to_message(row, OPERATION)).collect()
    }

    async fn append_messages(&self, messages: &[ChatMessage]) -> Result<(), RepositoryError> {
        const OPERATION: &str = "Failed to save messages";

        let mut tx = self.pool.begin().await.map_err(db_error(OPERATION))?;

        for message in messages {
            sqlx::query(
                r#"
                INSERT INTO "Message_v2" ("id", "chatId", "role", "parts", "attachments", "createdAt")
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(message.id.as_str())
            .bind(message.chat_id.as_str())
            .bind(message.role.as_str())
            .bind(Json(&message.parts))
            .bind(Json(&message.attachments))
            .bind(message.created_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(db_error(OPERATION))?;
        }

        tx.commit().await.map_err(db_error(OPERATION))?;

        Ok(())
    }

    async fn update_visibility(
        &self,
        chat_id: &ChatId,
        visibility: Visibility,
    ) -> Result<(), RepositoryError> {
        sqlx::query(r#"UPDATE "Chat" SET "visibility" = $2 WHERE "id" = $1"#)
            .bind(chat_id.as_str())
            .bind(visibility.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to update chat visibility by id"))?;

        Ok(())
    }

    async fn get_message_by_id(
        &self,
        id: &MessageId,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        const OPERATION: &str = "Failed to get message by id";

        let row = sqlx::query(
            r#"
            SELECT "id", "chatId", "role", "parts", "attachments", "createdAt"
            FROM "Message_v2"
            WHERE "id" = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error(OPERATION))?;

        row.map(|row| row_to_message(&row, OPERATION)).transpose()
    }

    async fn delete_trailing_messages(&self, anchor: &MessageId) -> Result<u64, RepositoryError> {
        const OPERATION: &str = "Failed to delete messages by chat id after timestamp";

        let mut tx = self.pool.begin().await.map_err(db_error(OPERATION))?;

        let row = sqlx::query(r#"SELECT "chatId", "createdAt" FROM "Message_v2" WHERE "id" = $1"#)
            .bind(anchor.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error(OPERATION))?;

        let Some(row) = row else {
            return Err(RepositoryError::NotFound("Message not found"));
        };
        let chat_id: String = row.get("chatId");
        let created_at: DateTime<Utc> = row.get("createdAt");

        let result = sqlx::query(
            r#"DELETE FROM "Message_v2" WHERE "chatId" = $1 AND "createdAt" >= $2"#,
        )
        .bind(&chat_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error(OPERATION))?;

        tx.commit().await.map_err(db_error(OPERATION))?;

        Ok(result.rows_affected())
    }

    async fn register_stream_id(
        &self,
        registration: &StreamRegistration,
    ) -> Result<(), RepositoryError> {
        sqlx::query(r#"INSERT INTO "Stream" ("id", "chatId", "createdAt") VALUES ($1, $2, $3)"#)
            .bind(registration.stream_id.as_uuid())
            .bind(registration.chat_id.as_str())
            .bind(registration.created_at.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to create stream id"))?;

        Ok(())
    }

    async fn list_stream_ids(&self, chat_id: &ChatId) -> Result<Vec<StreamId>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT "id" FROM "Stream" WHERE "chatId" = $1 ORDER BY "createdAt" ASC"#,
        )
        .bind(chat_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to get stream ids by chat id"))?;

        Ok(rows
            .iter()
            .map(|row| StreamId::from_uuid(row.get::<Uuid, _>("id")))
            .collect())
    }

    async fn update_last_context(
        &self,
        chat_id: &ChatId,
        usage: &TokenUsage,
    ) -> Result<(), RepositoryError> {
        sqlx::query(r#"UPDATE "Chat" SET "lastContext" = $2 WHERE "id" = $1"#)
            .bind(chat_id.as_str())
            .bind(Json(usage))
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to update last context for chat"))?;

        Ok(())
    }

    async fn count_user_messages_since(
        &self,
        user_id: &UserId,
        since: Timestamp,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(m."id")
            FROM "Message_v2" m
            JOIN "Chat" c ON c."id" = m."chatId"
            WHERE c."userId" = $1
              AND m."role" = 'user'
              AND m."createdAt" >= $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(since.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to get message count by user id"))?;

        Ok(count.max(0) as u64)
    }
}
