//! StreamChatHandler - accepts a user message and streams the model's reply.
//!
//! The handler validates ownership, prepares the conversation, persists the
//! user message, then hands the model output to a pump task. The pump
//! numbers and buffers every frame, forwards it to the client while the
//! client listens, and persists the assistant message once the model is
//! done, whether or not anyone is still listening.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::adapters::ai::ModelInvoker;
use crate::domain::chat::{
    Chat, ChatMessage, MessageAssembler, MessagePart, ModelEvent, Project, StreamRegistration,
    TokenUsage, UiStreamEvent, Visibility,
};
use crate::domain::foundation::{
    AuthenticatedUser, ChatId, DomainError, ErrorCode, MessageId, StreamId, Timestamp,
};
use crate::ports::{
    BufferedFrame, ChatRepository, ModelError, ResumableStreamStore, StreamResumption,
};

/// Rolling window for the daily message quota.
const QUOTA_WINDOW_HOURS: i64 = 24;

/// Command to send a user message and stream the reply.
#[derive(Debug, Clone)]
pub struct StreamChatCommand {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    /// Already validated user parts.
    pub parts: Vec<MessagePart>,
    pub selected_chat_model: String,
    pub visibility: Visibility,
}

/// Handler settings taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct StreamChatSettings {
    /// Maximum user messages per rolling day; `None` disables the check.
    pub daily_message_quota: Option<u32>,
    pub forward_reasoning: bool,
}

/// A started response stream.
pub struct ChatStream {
    pub stream_id: StreamId,
    /// Id announced in the `start` frame and used for the persisted reply.
    pub assistant_message_id: MessageId,
    /// Numbered frames for the client; closes after finalization.
    pub frames: mpsc::UnboundedReceiver<BufferedFrame>,
    /// Completes after the assistant message is persisted.
    pub completion: JoinHandle<()>,
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("stream_id", &self.stream_id)
            .field("assistant_message_id", &self.assistant_message_id)
            .finish_non_exhaustive()
    }
}

/// Handler for streaming chat replies.
pub struct StreamChatHandler {
    repository: Arc<dyn ChatRepository>,
    invoker: ModelInvoker,
    resumption: StreamResumption,
    settings: StreamChatSettings,
}

impl StreamChatHandler {
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        invoker: ModelInvoker,
        resumption: StreamResumption,
        settings: StreamChatSettings,
    ) -> Self {
        Self {
            repository,
            invoker,
            resumption,
            settings,
        }
    }

    pub async fn handle(
        &self,
        user: &AuthenticatedUser,
        cmd: StreamChatCommand,
    ) -> Result<ChatStream, DomainError> {
        let existing = self.repository.get_chat_by_id(&cmd.chat_id).await?;
        if let Some(chat) = &existing {
            if !chat.is_owned_by(&user.id) {
                return Err(DomainError::forbidden());
            }
        }

        self.check_quota(user).await?;

        if existing.is_none() {
            let project = Project::untitled(user.id.clone());
            self.repository.create_project(&project).await?;
            let chat = Chat::untitled(
                cmd.chat_id.clone(),
                user.id.clone(),
                cmd.visibility,
                project.id,
            );
            self.repository.create_chat(&chat).await?;
            tracing::info!(chat_id = %chat.id, user_id = %user.id, "conversation created");
        }

        let mut history = self.repository.list_messages(&cmd.chat_id).await?;
        let user_message = ChatMessage::user(cmd.message_id, cmd.chat_id.clone(), cmd.parts);
        self.repository
            .append_messages(std::slice::from_ref(&user_message))
            .await?;
        history.push(user_message.clone());

        let registration = StreamRegistration::new(cmd.chat_id.clone());
        self.repository.register_stream_id(&registration).await?;
        let stream_id = registration.stream_id;

        let invocation = self
            .invoker
            .invoke(&cmd.selected_chat_model, &history)
            .await
            .map_err(map_model_error)?;

        let store = match self.resumption.store() {
            Some(store) => match store.create(stream_id).await {
                Ok(()) => Some(store.clone()),
                Err(e) => {
                    tracing::warn!(%stream_id, error = %e, "stream buffering unavailable");
                    None
                }
            },
            None => None,
        };

        let assistant_message_id = MessageId::generate();
        let (outbound, frames) = mpsc::unbounded_channel();

        let pump = Pump {
            repository: self.repository.clone(),
            buffering: store.is_some(),
            store,
            stream_id,
            chat_id: cmd.chat_id,
            user_message_created_at: user_message.created_at,
            assembler: MessageAssembler::new(
                assistant_message_id.clone(),
                self.settings.forward_reasoning,
            ),
            outbound: Some(outbound),
            next_seq: 0,
        };
        let completion = tokio::spawn(pump.run(invocation.events, invocation.task));

        tracing::debug!(%stream_id, message_id = %assistant_message_id, "response stream started");

        Ok(ChatStream {
            stream_id,
            assistant_message_id,
            frames,
            completion,
        })
    }

    async fn check_quota(&self, user: &AuthenticatedUser) -> Result<(), DomainError> {
        let Some(quota) = self.settings.daily_message_quota else {
            return Ok(());
        };

        let since = Timestamp::now().minus_hours(QUOTA_WINDOW_HOURS);
        let sent = self
            .repository
            .count_user_messages_since(&user.id, since)
            .await?;

        if sent > u64::from(quota) {
            tracing::info!(user_id = %user.id, sent, quota, "daily message quota exceeded");
            return Err(DomainError::new(ErrorCode::RATE_LIMIT_CHAT));
        }
        Ok(())
    }
}

fn map_model_error(error: ModelError) -> DomainError {
    if error.is_billing() {
        tracing::warn!(error = %error, "model provider requires billing");
        return DomainError::new(ErrorCode::ACTIVATE_GATEWAY);
    }
    tracing::error!(error = %error, "model invocation failed before streaming");
    DomainError::offline()
}

/// Drains model events into frames and persists the result.
struct Pump {
    repository: Arc<dyn ChatRepository>,
    store: Option<Arc<dyn ResumableStreamStore>>,
    /// Cleared after a failed append; the buffered stream is still finished.
    buffering: bool,
    stream_id: StreamId,
    chat_id: ChatId,
    user_message_created_at: Timestamp,
    assembler: MessageAssembler,
    /// `None` once the client has gone.
    outbound: Option<mpsc::UnboundedSender<BufferedFrame>>,
    next_seq: u64,
}

impl Pump {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<Result<ModelEvent, ModelError>>,
        model_task: JoinHandle<()>,
    ) {
        let start = self.assembler.start();
        self.emit(start).await;

        let mut finished = false;
        while let Some(event) = events.recv().await {
            match event {
                Ok(event) => {
                    finished |= matches!(event, ModelEvent::Finish { .. });
                    for frame in self.assembler.apply(event) {
                        self.emit(frame).await;
                    }
                }
                Err(error) => {
                    tracing::error!(stream_id = %self.stream_id, error = %error, "model stream failed");
                    break;
                }
            }
        }

        if !finished {
            for frame in self.assembler.fail() {
                self.emit(frame).await;
            }
        }

        if let Err(e) = model_task.await {
            tracing::error!(stream_id = %self.stream_id, error = %e, "model task panicked");
        }

        self.finalize(finished).await;
    }

    async fn emit(&mut self, event: UiStreamEvent) {
        let data = match event.to_json() {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize stream frame");
                return;
            }
        };

        let seq = self.next_seq;
        self.next_seq += 1;

        if let (true, Some(store)) = (self.buffering, &self.store) {
            if let Err(e) = store.append(self.stream_id, data.clone()).await {
                tracing::warn!(stream_id = %self.stream_id, error = %e, "stream buffering stopped");
                self.buffering = false;
            }
        }

        if let Some(outbound) = &self.outbound {
            if outbound.send(BufferedFrame { seq, data }).is_err() {
                tracing::debug!(stream_id = %self.stream_id, "client disconnected; continuing in background");
                self.outbound = None;
            }
        }
    }

    async fn finalize(self, finished: bool) {
        let message_id = self.assembler.message_id().clone();
        let has_content = !self.assembler.is_empty();
        let (parts, usage) = self.assembler.into_parts();

        if has_content {
            let message = ChatMessage::assistant(
                message_id,
                self.chat_id.clone(),
                parts,
                Timestamp::now_after(&self.user_message_created_at),
            );
            if let Err(e) = self.repository.append_messages(&[message]).await {
                tracing::error!(chat_id = %self.chat_id, error = %e, "failed to persist assistant message");
            }
        }

        if finished && usage != TokenUsage::default() {
            if let Err(e) = self.repository.update_last_context(&self.chat_id, &usage).await {
                tracing::error!(chat_id = %self.chat_id, error = %e, "failed to record usage");
            }
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.finish(self.stream_id).await {
                tracing::warn!(stream_id = %self.stream_id, error = %e, "failed to finish buffered stream");
            }
        }

        tracing::info!(
            stream_id = %self.stream_id,
            chat_id = %self.chat_id,
            frames = self.next_seq,
            finished,
            "response stream closed"
        );
        // `self.outbound` drops here, ending the client stream.
    }
}
