//! Conversation, project and stream registration records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::TokenUsage;
use crate::domain::foundation::{ChatId, ProjectId, StreamId, Timestamp, UserId, ValidationError};

/// Title given to conversations and projects created implicitly.
pub const UNTITLED: &str = "Untitled";

/// Who may read a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Readable by its owner only.
    #[default]
    Private,
    /// Readable by anyone, including anonymous callers.
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Visibility::Private),
            "public" => Ok(Visibility::Public),
            other => Err(ValidationError::invalid_format(
                "visibility",
                format!("expected 'public' or 'private', got '{}'", other),
            )),
        }
    }
}

/// One chat thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub created_at: Timestamp,
    pub title: String,
    pub user_id: UserId,
    pub visibility: Visibility,
    pub project_id: ProjectId,
    /// Token usage of the most recent completed stream.
    pub last_context: Option<TokenUsage>,
}

impl Chat {
    /// A new conversation with the default title.
    pub fn untitled(
        id: ChatId,
        user_id: UserId,
        visibility: Visibility,
        project_id: ProjectId,
    ) -> Self {
        Self {
            id,
            created_at: Timestamp::now(),
            title: UNTITLED.to_string(),
            user_id,
            visibility,
            project_id,
            last_context: None,
        }
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }

    /// Whether `viewer` may read this conversation.
    pub fn is_readable_by(&self, viewer: Option<&UserId>) -> bool {
        match self.visibility {
            Visibility::Public => true,
            Visibility::Private => viewer.map_or(false, |id| self.is_owned_by(id)),
        }
    }
}

/// Per-user container of conversations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    pub created_at: Timestamp,
}

impl Project {
    pub fn untitled(user_id: UserId) -> Self {
        Self {
            id: ProjectId::new(),
            user_id,
            name: UNTITLED.to_string(),
            created_at: Timestamp::now(),
        }
    }
}

/// Durable handle for reattaching to a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRegistration {
    pub stream_id: StreamId,
    pub chat_id: ChatId,
    pub created_at: Timestamp,
}

impl StreamRegistration {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            stream_id: StreamId::new(),
            chat_id,
            created_at: Timestamp::now(),
        }
    }
}
