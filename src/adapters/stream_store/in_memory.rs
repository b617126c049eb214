//! In-memory resumable stream store for tests and single-server deployments.
//!
//! Frames live in process memory, so a reconnecting client must land on the
//! instance that produced the stream.

use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};

use crate::domain::foundation::StreamId;
use crate::ports::{BufferedFrame, FrameStream, ResumableStreamStore, StreamStoreError};

/// In-memory resumable stream store.
///
/// Entries expire `ttl` after their last write, finished or not.
#[derive(Debug, Clone)]
pub struct InMemoryStreamStore {
    streams: Arc<RwLock<HashMap<StreamId, StreamEntry>>>,
    ttl: Duration,
}

#[derive(Debug)]
struct StreamEntry {
    frames: Vec<String>,
    finished: bool,
    touched_at: Instant,
    /// Bumped on every append and on finish.
    changed: watch::Sender<u64>,
}

impl StreamEntry {
    fn new() -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            frames: Vec::new(),
            finished: false,
            touched_at: Instant::now(),
            changed,
        }
    }

    fn touch(&mut self) {
        self.touched_at = Instant::now();
        self.changed.send_modify(|version| *version += 1);
    }
}

impl InMemoryStreamStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Number of buffered streams, including finished ones not yet expired.
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    fn evict_expired(&self, streams: &mut HashMap<StreamId, StreamEntry>) {
        let ttl = self.ttl;
        streams.retain(|_, entry| entry.touched_at.elapsed() < ttl);
    }
}

impl Default for InMemoryStreamStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

/// Follow state for one reader.
struct Follower {
    streams: Arc<RwLock<HashMap<StreamId, StreamEntry>>>,
    stream_id: StreamId,
    ttl: Duration,
    next: u64,
    changed: watch::Receiver<u64>,
}

impl Follower {
    async fn next_frame(&mut self) -> Option<BufferedFrame> {
        loop {
            let _seen = *self.changed.borrow_and_update();
            let expires_at = {
                let streams = self.streams.read().await;
                let entry = streams.get(&self.stream_id)?;
                if let Some(data) = entry.frames.get(self.next as usize) {
                    let frame = BufferedFrame {
                        seq: self.next,
                        data: data.clone(),
                    };
                    self.next += 1;
                    return Some(frame);
                }
                if entry.finished || entry.touched_at.elapsed() >= self.ttl {
                    return None;
                }
                entry.touched_at + self.ttl
            };
            // A writer that never finishes leaves the entry to expire.
            match tokio::time::timeout_at(expires_at.into(), self.changed.changed()).await {
                Ok(Ok(())) | Err(_) => {}
                // Sender dropped means the entry was evicted.
                Ok(Err(_)) => return None,
            }
        }
    }
}

#[async_trait]
impl ResumableStreamStore for InMemoryStreamStore {
    async fn create(&self, stream_id: StreamId) -> Result<(), StreamStoreError> {
        let mut streams = self.streams.write().await;
        self.evict_expired(&mut streams);
        streams.insert(stream_id, StreamEntry::new());
        Ok(())
    }

    async fn append(&self, stream_id: StreamId, data: String) -> Result<u64, StreamStoreError> {
        let mut streams = self.streams.write().await;
        let entry = streams
            .get_mut(&stream_id)
            .ok_or(StreamStoreError::UnknownStream(stream_id))?;
        entry.frames.push(data);
        entry.touch();
        Ok(entry.frames.len() as u64 - 1)
    }

    async fn finish(&self, stream_id: StreamId) -> Result<(), StreamStoreError> {
        let mut streams = self.streams.write().await;
        let entry = streams
            .get_mut(&stream_id)
            .ok_or(StreamStoreError::UnknownStream(stream_id))?;
        entry.finished = true;
        entry.touch();
        Ok(())
    }

    async fn resume(
        &self,
        stream_id: StreamId,
        after: Option<u64>,
    ) -> Result<Option<FrameStream>, StreamStoreError> {
        let streams = self.streams.read().await;
        let Some(entry) = streams.get(&stream_id) else {
            return Ok(None);
        };
        if entry.touched_at.elapsed() >= self.ttl {
            return Ok(None);
        }

        let follower = Follower {
            streams: self.streams.clone(),
            stream_id,
            ttl: self.ttl,
            next: after.map_or(0, |seq| seq + 1),
            changed: entry.changed.subscribe(),
        };

        let frames = stream::unfold(follower, |mut follower| async move {
            let frame = follower.next_frame().await?;
            Some((Ok(frame), follower))
        });

        Ok(Some(Box::pin(frames)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(stream: FrameStream) -> Vec<(u64, String)> {
        stream
            .map(|frame| {
                let frame = frame.unwrap();
                (frame.seq, frame.data)
            })
            .collect()
            .await
    }

    #[tokio::test]
    async fn appends_are_numbered_from_zero() {
        let store = InMemoryStreamStore::default();
        let id = StreamId::new();
        store.create(id).await.unwrap();

        assert_eq!(store.append(id, "a".into()).await.unwrap(), 0);
        assert_eq!(store.append(id, "b".into()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn append_to_unknown_stream_fails() {
        let store = InMemoryStreamStore::default();
        let result = store.append(StreamId::new(), "a".into()).await;
        assert!(matches!(result, Err(StreamStoreError::UnknownStream(_))));
    }

    #[tokio::test]
    async fn finished_stream_replays_backlog_after_cursor() {
        let store = InMemoryStreamStore::default();
        let id = StreamId::new();
        store.create(id).await.unwrap();
        for data in ["a", "b", "c"] {
            store.append(id, data.into()).await.unwrap();
        }
        store.finish(id).await.unwrap();

        let all = collect(store.resume(id, None).await.unwrap().unwrap()).await;
        assert_eq!(all, vec![(0, "a".into()), (1, "b".into()), (2, "c".into())]);

        let rest = collect(store.resume(id, Some(1)).await.unwrap().unwrap()).await;
        assert_eq!(rest, vec![(2, "c".into())]);
    }

    #[tokio::test]
    async fn unknown_stream_resumes_to_none() {
        let store = InMemoryStreamStore::default();
        assert!(store.resume(StreamId::new(), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn live_stream_is_followed_until_finish() {
        let store = InMemoryStreamStore::default();
        let id = StreamId::new();
        store.create(id).await.unwrap();
        store.append(id, "a".into()).await.unwrap();

        let reader = store.resume(id, None).await.unwrap().unwrap();
        let collected = tokio::spawn(collect(reader));

        tokio::time::sleep(Duration::from_millis(10)).await;
        store.append(id, "b".into()).await.unwrap();
        store.append(id, "c".into()).await.unwrap();
        store.finish(id).await.unwrap();

        let frames = collected.await.unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], (2, "c".into()));
    }

    #[tokio::test]
    async fn abandoned_stream_reader_ends_at_expiry() {
        let store = InMemoryStreamStore::new(Duration::from_millis(50));
        let id = StreamId::new();
        store.create(id).await.unwrap();
        store.append(id, "a".into()).await.unwrap();

        let reader = store.resume(id, None).await.unwrap().unwrap();
        let frames = tokio::time::timeout(Duration::from_secs(2), collect(reader))
            .await
            .expect("reader should stop once the entry expires");
        assert_eq!(frames, vec![(0, "a".into())]);
    }

    #[tokio::test]
    async fn expired_streams_are_evicted() {
        let store = InMemoryStreamStore::new(Duration::from_millis(5));
        let old = StreamId::new();
        store.create(old).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.resume(old, None).await.unwrap().is_none());

        store.create(StreamId::new()).await.unwrap();
        assert_eq!(store.stream_count().await, 1);
    }
}
