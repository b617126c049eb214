//! HTTP handlers for chat endpoints.
//!
//! Streaming responses are Server-Sent Events. Each frame is written as
//! `id: <seq>` plus `data: <json>`, and every stream ends with `data: [DONE]`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{future, stream, Stream, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::adapters::ai::ModelInvoker;
use crate::adapters::http::middleware::{OptionalAuth, RequireAuth};
use crate::application::handlers::{
    ChatQueryHandler, ResumeOutcome, ResumeStreamHandler, ResumeStreamQuery, StreamChatHandler,
    StreamChatSettings,
};
use crate::domain::chat::UiStreamEvent;
use crate::domain::foundation::{ChatId, DomainError, ErrorCode, MessageId};
use crate::ports::{BufferedFrame, ChatRepository, StreamResumption};

use super::dto::{decode_json, PostChatRequest, SuccessResponse, UpdateVisibilityRequest};

/// Terminal SSE payload.
pub const DONE_MARKER: &str = "[DONE]";

/// Header carrying the last sequence number a reconnecting client received.
pub const LAST_EVENT_ID: &str = "last-event-id";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for chat endpoints.
///
/// Cloned per request; every dependency is behind an `Arc` or cheap to clone.
#[derive(Clone)]
pub struct ChatAppState {
    pub repository: Arc<dyn ChatRepository>,
    pub invoker: ModelInvoker,
    pub resumption: StreamResumption,
    pub settings: StreamChatSettings,
}

impl ChatAppState {
    /// Create handlers on demand from the shared state.
    pub fn stream_chat_handler(&self) -> StreamChatHandler {
        StreamChatHandler::new(
            self.repository.clone(),
            self.invoker.clone(),
            self.resumption.clone(),
            self.settings.clone(),
        )
    }

    pub fn query_handler(&self) -> ChatQueryHandler {
        ChatQueryHandler::new(self.repository.clone())
    }

    pub fn resume_handler(&self) -> ResumeStreamHandler {
        ResumeStreamHandler::new(self.repository.clone(), self.resumption.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SSE helpers
// ════════════════════════════════════════════════════════════════════════════════

fn frame_event(frame: BufferedFrame) -> Event {
    Event::default().id(frame.seq.to_string()).data(frame.data)
}

/// SSE response for `events`, terminated by `[DONE]`.
fn sse_response<S>(events: S) -> Response
where
    S: Stream<Item = Event> + Send + 'static,
{
    let events = events
        .chain(stream::once(future::ready(Event::default().data(DONE_MARKER))))
        .map(Ok::<_, Infallible>);
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

fn parse_last_event_id(headers: &HeaderMap) -> Result<Option<u64>, DomainError> {
    let Some(value) = headers.get(LAST_EVENT_ID) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Some)
        .ok_or_else(|| DomainError::bad_request("Last-Event-ID must be a frame sequence number"))
}

// ════════════════════════════════════════════════════════════════════════════════
// Streaming Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/chat - Send a user message and stream the reply
///
/// The body is decoded before the session is checked, so a malformed request
/// is `bad_request:api` even without a session.
pub async fn post_chat(
    State(state): State<ChatAppState>,
    auth: OptionalAuth,
    body: Bytes,
) -> Result<Response, DomainError> {
    let request: PostChatRequest = decode_json(&body)?;
    let command = request.into_command()?;
    let user = auth.require()?;

    let chat = state.stream_chat_handler().handle(&user, command).await?;
    tracing::debug!(
        stream_id = %chat.stream_id,
        message_id = %chat.assistant_message_id,
        "streaming reply"
    );

    // The completion task is detached; it persists the reply on its own.
    let frames = UnboundedReceiverStream::new(chat.frames).map(frame_event);
    Ok(sse_response(frames))
}

/// GET /api/chat/:id/stream - Resume the latest stream of a conversation
pub async fn resume_stream(
    State(state): State<ChatAppState>,
    Path(id): Path<String>,
    OptionalAuth(user): OptionalAuth,
    headers: HeaderMap,
) -> Result<Response, DomainError> {
    let query = ResumeStreamQuery {
        chat_id: ChatId::new(id)?,
        last_event_id: parse_last_event_id(&headers)?,
    };

    let outcome = state
        .resume_handler()
        .handle(user.as_ref().map(|u| &u.id), query)
        .await?;

    match outcome {
        ResumeOutcome::Frames(frames) => {
            let events = frames
                .take_while(|frame| {
                    if let Err(e) = frame {
                        tracing::warn!(error = %e, "resumed stream interrupted");
                    }
                    future::ready(frame.is_ok())
                })
                .filter_map(|frame| future::ready(frame.ok().map(frame_event)));
            Ok(sse_response(events))
        }
        ResumeOutcome::AppendMessage(message) => {
            let data = serde_json::to_string(&message)
                .map_err(|e| DomainError::with_cause(ErrorCode::OFFLINE_CHAT, e.to_string()))?;
            let frame = UiStreamEvent::DataAppendMessage {
                data,
                transient: true,
            }
            .to_json()
            .map_err(|e| DomainError::with_cause(ErrorCode::OFFLINE_CHAT, e.to_string()))?;
            Ok(sse_response(stream::once(future::ready(
                Event::default().data(frame),
            ))))
        }
        ResumeOutcome::NoContent => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/chat/:id - The conversation, or `null`
pub async fn get_chat(
    State(state): State<ChatAppState>,
    Path(id): Path<String>,
    OptionalAuth(user): OptionalAuth,
) -> Result<impl IntoResponse, DomainError> {
    let chat_id = ChatId::new(id)?;
    let chat = state
        .query_handler()
        .get_chat(user.as_ref().map(|u| &u.id), &chat_id)
        .await?;
    Ok(Json(chat))
}

/// GET /api/chat/:id/messages - Messages oldest first
pub async fn get_messages(
    State(state): State<ChatAppState>,
    Path(id): Path<String>,
    OptionalAuth(user): OptionalAuth,
) -> Result<impl IntoResponse, DomainError> {
    let chat_id = ChatId::new(id)?;
    let messages = state
        .query_handler()
        .get_messages(user.as_ref().map(|u| &u.id), &chat_id)
        .await?;
    Ok(Json(messages))
}

/// GET /api/message/:id - A single message
pub async fn get_message(
    State(state): State<ChatAppState>,
    Path(id): Path<String>,
    OptionalAuth(user): OptionalAuth,
) -> Result<impl IntoResponse, DomainError> {
    let message_id = MessageId::new(id)?;
    let message = state
        .query_handler()
        .get_message(user.as_ref().map(|u| &u.id), &message_id)
        .await?;
    Ok(Json(message))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// PATCH /api/chat/:id/visibility - Change who may read a conversation
pub async fn update_visibility(
    State(state): State<ChatAppState>,
    Path(id): Path<String>,
    auth: OptionalAuth,
    body: Bytes,
) -> Result<impl IntoResponse, DomainError> {
    let chat_id = ChatId::new(id)?;
    let request: UpdateVisibilityRequest = decode_json(&body)?;
    let user = auth.require()?;

    state
        .query_handler()
        .update_visibility(&user.id, &chat_id, request.visibility)
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

/// DELETE /api/message/:id/trailing - Delete a message and everything after it
pub async fn delete_trailing_messages(
    State(state): State<ChatAppState>,
    Path(id): Path<String>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, DomainError> {
    let anchor = MessageId::new(id)?;
    state
        .query_handler()
        .delete_trailing_messages(&user.id, &anchor)
        .await?;
    Ok(Json(SuccessResponse::ok()))
}
