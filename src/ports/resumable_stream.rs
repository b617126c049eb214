//! Resumable stream port - buffers emitted frames so clients can reattach.
//!
//! Frames are numbered from 0 in emission order. A reader resumes after the
//! last sequence number it saw, receives the buffered backlog, and then
//! follows new frames until the writer marks the stream finished.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::foundation::StreamId;

/// A frame as stored, with its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedFrame {
    pub seq: u64,
    /// Serialized frame payload.
    pub data: String,
}

/// Backlog followed by live frames; ends when the stream is finished.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<BufferedFrame, StreamStoreError>> + Send>>;

#[derive(Debug, Clone, Error)]
pub enum StreamStoreError {
    #[error("stream store unavailable: {0}")]
    Unavailable(String),

    #[error("unknown stream: {0}")]
    UnknownStream(StreamId),

    #[error("corrupt stream entry: {0}")]
    Corrupt(String),
}

/// Storage for in-flight and recently finished streams.
#[async_trait]
pub trait ResumableStreamStore: Send + Sync {
    /// Start buffering a stream.
    async fn create(&self, stream_id: StreamId) -> Result<(), StreamStoreError>;

    /// Append a frame, returning its sequence number.
    async fn append(&self, stream_id: StreamId, data: String) -> Result<u64, StreamStoreError>;

    /// Mark a stream complete; readers stop following after the backlog.
    async fn finish(&self, stream_id: StreamId) -> Result<(), StreamStoreError>;

    /// Frames with sequence number greater than `after` (all when `None`).
    ///
    /// Returns `None` if the stream is unknown or has expired.
    async fn resume(
        &self,
        stream_id: StreamId,
        after: Option<u64>,
    ) -> Result<Option<FrameStream>, StreamStoreError>;
}

/// Whether stream resumption is available, and through which store.
#[derive(Clone)]
pub enum StreamResumption {
    Enabled(Arc<dyn ResumableStreamStore>),
    Disabled,
}

impl StreamResumption {
    pub fn store(&self) -> Option<&Arc<dyn ResumableStreamStore>> {
        match self {
            StreamResumption::Enabled(store) => Some(store),
            StreamResumption::Disabled => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, StreamResumption::Enabled(_))
    }
}

impl std::fmt::Debug for StreamResumption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamResumption::Enabled(_) => f.write_str("StreamResumption::Enabled"),
            StreamResumption::Disabled => f.write_str("StreamResumption::Disabled"),
        }
    }
}
