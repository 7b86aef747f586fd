use super::{STREAM_ATTEMPTS_KEY, STREAM_ID_NEW, STREAM_PAYLOAD_KEY};
use crate::library::communication::event::RawQueueEntry;
use crate::library::EmptyResult;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::StreamId;
use redis::AsyncCommands;
use tracing::warn;

/// Redis based implementation of the [`RawQueueEntry`] trait
///
/// Requeueing appends a copy of the entry with an incremented attempt counter to the stream and
/// acknowledges the original one within a single transaction.
///
/// Entries without a payload (e.g. pending ones whose data has been trimmed from the stream)
/// are handed out with an empty payload. Requeueing them acknowledges them instead as there
/// is nothing left to redeliver.
pub struct RedisQueueEntry {
    con: MultiplexedConnection,
    key: String,
    group: String,
    content: StreamEntryContent,
}

impl RedisQueueEntry {
    pub(super) fn new(
        con: MultiplexedConnection,
        entry: StreamId,
        key: String,
        group: String,
    ) -> Self {
        let content = parse_stream_entry(entry);

        if content.payload.is_none() {
            warn!(id = %content.id, %key, "Stream entry carries no payload");
        }

        Self {
            con,
            key,
            group,
            content,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct StreamEntryContent {
    id: String,
    payload: Option<Vec<u8>>,
    attempts: u32,
}

fn parse_stream_entry(entry: StreamId) -> StreamEntryContent {
    let payload = entry.get(STREAM_PAYLOAD_KEY);
    let attempts = entry.get(STREAM_ATTEMPTS_KEY).unwrap_or(1);

    StreamEntryContent {
        id: entry.id,
        payload,
        attempts,
    }
}

#[async_trait]
impl RawQueueEntry for RedisQueueEntry {
    fn payload(&self) -> &[u8] {
        self.content.payload.as_deref().unwrap_or_default()
    }

    fn delivery_count(&self) -> u32 {
        self.content.attempts
    }

    async fn acknowledge(&mut self) -> EmptyResult {
        self.con
            .xack::<_, _, _, ()>(&self.key, &self.group, &[&self.content.id])
            .await?;

        Ok(())
    }

    async fn requeue(&mut self) -> EmptyResult {
        if self.content.payload.is_none() {
            return self.acknowledge().await;
        }

        let payload = self.content.payload.as_deref().unwrap_or_default();

        let attempts = (self.content.attempts + 1).to_string();
        let fields = [
            (STREAM_PAYLOAD_KEY, payload),
            (STREAM_ATTEMPTS_KEY, attempts.as_bytes()),
        ];

        let mut pipeline = redis::pipe();
        pipeline
            .atomic()
            .xadd(&self.key, STREAM_ID_NEW, &fields)
            .ignore()
            .xack(&self.key, &self.group, &[&self.content.id])
            .ignore();

        pipeline.query_async::<_, ()>(&mut self.con).await?;

        Ok(())
    }
}
