use super::{RedisFactory, RedisQueueEntry, STREAM_ID_ADDITIONS, STREAM_ID_HEAD};
use crate::library::communication::event::{
    ConsumerGroupDescriptor, QueueDescriptor, QueueProvider,
};
use crate::library::BoxedError;
use async_trait::async_trait;
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use redis::aio::ConnectionLike;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisResult};
use tracing::{debug, error};

/// Queue provider implementation using [Redis Streams](https://redis.io/topics/streams-intro)
pub struct RedisQueueProvider {
    factory: RedisFactory,
}

impl RedisQueueProvider {
    /// Creates a new instance with a given [`RedisFactory`]
    pub fn new(factory: RedisFactory) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl QueueProvider for RedisQueueProvider {
    type Entry = RedisQueueEntry;

    /// Consumes a redis stream data structure using the following steps:
    ///
    /// 1. Create the stream and/or consumer group if it does not exist
    /// 2. Start streaming entries from the PEL until the queue head is reached
    /// 3. Wait for and stream new entries in a blocking manner
    async fn consume(
        &self,
        queue: &QueueDescriptor,
        group: &ConsumerGroupDescriptor,
        consumer: &str,
        batch_size: usize,
    ) -> Result<BoxStream<'static, Result<Self::Entry, BoxedError>>, BoxedError> {
        let key = queue.key().to_owned();

        // Create a redis connection for the blocking XREADGROUP command
        let mut con = self.factory.owned().await?;

        create_consumer_group(&mut con, &key, group).await;

        let read_options = StreamReadOptions::default()
            .group(group.identifier(), consumer)
            .count(batch_size)
            .block(0);

        let entry_stream = xread_stream(con, read_options, key.clone());

        // Shared connection used by all entries to settle themselves
        let ack_con = self.factory.multiplexed().await?;
        let group = group.identifier().to_owned();

        let stream = entry_stream
            .map(move |entry| -> Result<RedisQueueEntry, BoxedError> {
                Ok(RedisQueueEntry::new(
                    ack_con.clone(),
                    entry?,
                    key.clone(),
                    group.clone(),
                ))
            })
            .boxed();

        Ok(stream)
    }
}

async fn create_consumer_group<C: ConnectionLike + Send>(
    con: &mut C,
    key: &str,
    group: &ConsumerGroupDescriptor,
) {
    // Fails with BUSYGROUP if the group already exists
    if let Err(e) = con
        .xgroup_create_mkstream::<_, _, _, ()>(key, group.identifier(), STREAM_ID_HEAD)
        .await
    {
        debug!(error = %e, %key, "Consumer group not created");
    }
}

fn xread_stream<C: ConnectionLike + Send + 'static>(
    con: C,
    options: StreamReadOptions,
    key: String,
) -> BoxStream<'static, RedisResult<StreamId>> {
    let initial = Some((con, options, STREAM_ID_HEAD.to_string()));

    let stream = stream::unfold(initial, move |state| {
        let key = key.clone();

        async move {
            let (mut con, options, id) = state?;

            let result = con
                .xread_options::<_, _, StreamReadReply>(&[&key], &[&id], &options)
                .await;

            match result {
                Ok(mut reply) => {
                    let ids = reply.keys.pop().map(|s| s.ids).unwrap_or_default();

                    let next_id = if id == STREAM_ID_ADDITIONS {
                        // Already operating on new entries, continue doing so
                        id
                    } else if let Some(last) = ids.last() {
                        // More entries pending from a previous run
                        last.id.to_owned()
                    } else {
                        debug!(%key, "Pending entries exhausted, waiting for new ones");
                        STREAM_ID_ADDITIONS.to_string()
                    };

                    Some((Ok(ids), Some((con, options, next_id))))
                }
                Err(e) => {
                    error!(error = %e, %key, "Failed to read from redis stream");
                    Some((Err(e), None))
                }
            }
        }
    });

    // Batches are flattened so the stream yields one entry at a time
    stream
        .flat_map(|result| match result {
            Ok(batch) => stream::iter(batch).map(Ok).boxed(),
            Err(e) => stream::once(async { Err(e) }).boxed(),
        })
        .boxed()
}
