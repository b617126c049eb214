//! Redis-backed resumable stream store for multi-server deployments.
//!
//! Each stream uses two keys:
//! - `<prefix>:stream:<id>:frames` - list of serialized frames, RPUSH order
//! - `<prefix>:stream:<id>:state` - `live` or `done`
//!
//! Both keys carry the buffer TTL, refreshed on every write. Readers poll
//! the list; a reader that sees `done` drains what is left and stops.

use async_trait::async_trait;
use futures::stream;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::VecDeque;
use std::time::Duration;

use crate::domain::foundation::StreamId;
use crate::ports::{BufferedFrame, FrameStream, ResumableStreamStore, StreamStoreError};

const STATE_LIVE: &str = "live";
const STATE_DONE: &str = "done";

fn unavailable(e: redis::RedisError) -> StreamStoreError {
    StreamStoreError::Unavailable(e.to_string())
}

/// Redis-backed resumable stream store.
#[derive(Clone)]
pub struct RedisStreamStore {
    conn: MultiplexedConnection,
    key_prefix: String,
    ttl: Duration,
    poll_interval: Duration,
}

impl RedisStreamStore {
    pub fn new(
        conn: MultiplexedConnection,
        key_prefix: impl Into<String>,
        ttl: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            ttl,
            poll_interval,
        }
    }

    fn frames_key(&self, stream_id: StreamId) -> String {
        format!("{}:stream:{}:frames", self.key_prefix, stream_id)
    }

    fn state_key(&self, stream_id: StreamId) -> String {
        format!("{}:stream:{}:state", self.key_prefix, stream_id)
    }

    fn ttl_secs(&self) -> i64 {
        self.ttl.as_secs().max(1) as i64
    }
}

/// Poll state for one reader.
struct Poller {
    conn: MultiplexedConnection,
    frames_key: String,
    state_key: String,
    next: u64,
    pending: VecDeque<BufferedFrame>,
    poll_interval: Duration,
    drained: bool,
}

impl Poller {
    async fn next_frame(&mut self) -> Option<Result<BufferedFrame, StreamStoreError>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(Ok(frame));
            }
            if self.drained {
                return None;
            }

            // State first: once `done` is observed every frame is already in the list.
            let state: Option<String> = match self.conn.get(&self.state_key).await {
                Ok(state) => state,
                Err(e) => return Some(Err(unavailable(e))),
            };
            let finished = state.as_deref() != Some(STATE_LIVE);

            let frames: Vec<String> = match self
                .conn
                .lrange(&self.frames_key, self.next as isize, -1)
                .await
            {
                Ok(frames) => frames,
                Err(e) => return Some(Err(unavailable(e))),
            };

            for data in frames {
                self.pending.push_back(BufferedFrame {
                    seq: self.next,
                    data,
                });
                self.next += 1;
            }

            if finished {
                self.drained = true;
            } else if self.pending.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }
}

#[async_trait]
impl ResumableStreamStore for RedisStreamStore {
    async fn create(&self, stream_id: StreamId) -> Result<(), StreamStoreError> {
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .del(self.frames_key(stream_id))
            .ignore()
            .set_ex(self.state_key(stream_id), STATE_LIVE, self.ttl_secs() as u64)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(())
    }

    async fn append(&self, stream_id: StreamId, data: String) -> Result<u64, StreamStoreError> {
        let frames_key = self.frames_key(stream_id);
        let state_key = self.state_key(stream_id);
        let mut conn = self.conn.clone();

        let exists: bool = conn.exists(&state_key).await.map_err(unavailable)?;
        if !exists {
            return Err(StreamStoreError::UnknownStream(stream_id));
        }

        let (len,): (u64,) = redis::pipe()
            .atomic()
            .rpush(&frames_key, data)
            .expire(&frames_key, self.ttl_secs())
            .ignore()
            .expire(&state_key, self.ttl_secs())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        len.checked_sub(1)
            .ok_or_else(|| StreamStoreError::Corrupt(format!("empty frame list for {}", stream_id)))
    }

    async fn finish(&self, stream_id: StreamId) -> Result<(), StreamStoreError> {
        let mut conn = self.conn.clone();

        conn.set_ex::<_, _, ()>(self.state_key(stream_id), STATE_DONE, self.ttl_secs() as u64)
            .await
            .map_err(unavailable)?;

        Ok(())
    }

    async fn resume(
        &self,
        stream_id: StreamId,
        after: Option<u64>,
    ) -> Result<Option<FrameStream>, StreamStoreError> {
        let state_key = self.state_key(stream_id);
        let mut conn = self.conn.clone();

        let state: Option<String> = conn.get(&state_key).await.map_err(unavailable)?;
        if state.is_none() {
            return Ok(None);
        }

        let poller = Poller {
            conn,
            frames_key: self.frames_key(stream_id),
            state_key,
            next: after.map_or(0, |seq| seq + 1),
            pending: VecDeque::new(),
            poll_interval: self.poll_interval,
            drained: false,
        };

        let frames = stream::unfold(poller, |mut poller| async move {
            let item = poller.next_frame().await?;
            Some((item, poller))
        });

        Ok(Some(Box::pin(frames)))
    }
}

impl std::fmt::Debug for RedisStreamStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamStore")
            .field("key_prefix", &self.key_prefix)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn store() -> RedisStreamStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let client = redis::Client::open(url).unwrap();
        let conn = client.get_multiplexed_tokio_connection().await.unwrap();
        RedisStreamStore::new(
            conn,
            "chat-relay-test",
            Duration::from_secs(30),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn frames_replay_after_cursor() {
        let store = store().await;
        let id = StreamId::new();
        store.create(id).await.unwrap();
        assert_eq!(store.append(id, "a".into()).await.unwrap(), 0);
        assert_eq!(store.append(id, "b".into()).await.unwrap(), 1);
        store.finish(id).await.unwrap();

        let frames: Vec<BufferedFrame> = store
            .resume(id, Some(0))
            .await
            .unwrap()
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(frames, vec![BufferedFrame { seq: 1, data: "b".into() }]);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn live_stream_is_polled_until_done() {
        let store = store().await;
        let id = StreamId::new();
        store.create(id).await.unwrap();

        let reader = store.resume(id, None).await.unwrap().unwrap();
        let collected = tokio::spawn(reader.map(Result::unwrap).collect::<Vec<_>>());

        store.append(id, "a".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        store.append(id, "b".into()).await.unwrap();
        store.finish(id).await.unwrap();

        assert_eq!(collected.await.unwrap().len(), 2);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn unknown_stream_resumes_to_none() {
        let store = store().await;
        assert!(store.resume(StreamId::new(), None).await.unwrap().is_none());
        assert!(store.append(StreamId::new(), "a".into()).await.is_err());
    }
}
