use super::{
    ConsumerGroupDescriptor, ConsumerIdentifier, QueueDescriptor, QueueProvider, RawQueueEntry,
};
use crate::library::EmptyResult;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

// Fetching one entry at a time keeps the number of delivered but unsettled entries
// at or below the concurrency limit of the consumer.
const DEFAULT_BATCH_SIZE: usize = 1;

const MAX_REQUEUE_DELAY: Duration = Duration::from_secs(15 * 60);

/// Decision on how a delivered entry is settled with the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the entry from the queue
    Acknowledge,
    /// Hand the entry back to the queue so it will be delivered again
    Requeue,
}

/// Frame around a raw notification payload containing additional delivery context
#[derive(Debug, Clone, Copy)]
pub struct NotificationFrame<'a> {
    payload: &'a [u8],
    delivery_count: u32,
}

impl<'a> NotificationFrame<'a> {
    /// Creates a new instance from raw parts
    pub fn new(payload: &'a [u8], delivery_count: u32) -> Self {
        Self {
            payload,
            delivery_count,
        }
    }

    /// Raw payload as it has been received from the bus
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Number of times the notification has been delivered, including this delivery
    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }
}

/// Errors which end the consumption of a queue
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The bus stopped delivering notifications without being asked to
    #[error("notification stream closed unexpectedly")]
    StreamClosed,
}

/// Parameters describing what and how a [`Consumer`] consumes
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Queue to read from
    pub queue: QueueDescriptor,
    /// Group to join
    pub group: ConsumerGroupDescriptor,
    /// Name of this consumer within the group
    pub consumer: ConsumerIdentifier,
    /// Upper bound for notifications being processed concurrently
    pub max_in_flight: usize,
    /// Maximum time in-flight notifications may take to finish after shutdown has been requested.
    /// Waits indefinitely when not set.
    pub drain_timeout: Option<Duration>,
    /// Time a notification is held back per previous delivery before it is requeued
    pub requeue_delay: Duration,
}

/// Entity which may process raw notifications
#[async_trait]
pub trait Consumer {
    /// Processes a notification and decides how it will be settled
    async fn consume(&self, frame: NotificationFrame<'_>) -> Disposition;
}

/// Helper functions to aid the consumption of messages
#[async_trait]
pub trait ConsumerExt {
    /// Consumes notifications from a queue using the given provider and settles each
    /// according to the [`Disposition`] returned by the [`Consumer`].
    ///
    /// At most [`max_in_flight`](Subscription::max_in_flight) notifications are processed concurrently,
    /// further ones are not fetched from the bus until a slot frees up. Once `shutdown` resolves,
    /// no new notifications are fetched and the call returns after all in-flight ones have been settled.
    async fn consume_queue<Q, S>(
        &self,
        provider: &Q,
        subscription: &Subscription,
        shutdown: S,
    ) -> EmptyResult
    where
        Q: QueueProvider + Send + Sync,
        S: Future<Output = ()> + Send;
}

#[async_trait]
impl<C> ConsumerExt for C
where
    C: Consumer + Send + Sync,
{
    async fn consume_queue<Q, S>(
        &self,
        provider: &Q,
        subscription: &Subscription,
        shutdown: S,
    ) -> EmptyResult
    where
        Q: QueueProvider + Send + Sync,
        S: Future<Output = ()> + Send,
    {
        let stream = provider
            .consume(
                &subscription.queue,
                &subscription.group,
                &subscription.consumer,
                DEFAULT_BATCH_SIZE,
            )
            .await?;

        let shutdown = async move {
            shutdown.await;
            info!("Stopped fetching notifications, draining in-flight ones");
        }
        .boxed()
        .shared();

        let requeue_delay = subscription.requeue_delay;
        let consumption = stream.take_until(shutdown.clone()).for_each_concurrent(
            subscription.max_in_flight.max(1),
            |item| {
                let shutdown = shutdown.clone();

                async move {
                    match item {
                        Ok(entry) => settle(self, entry, requeue_delay, shutdown).await,
                        Err(error) => warn!(%error, "Failed to receive notification"),
                    }
                }
            },
        );

        match subscription.drain_timeout {
            Some(limit) => {
                let deadline = shutdown.clone().then(|_| sleep(limit));

                tokio::select! {
                    _ = consumption => {},
                    _ = deadline => warn!(?limit, "Drain deadline exceeded, abandoning in-flight notifications"),
                }
            }
            None => consumption.await,
        }

        if shutdown.peek().is_some() {
            info!("Notification consumption stopped");
            Ok(())
        } else {
            Err(ConsumerError::StreamClosed.into())
        }
    }
}

async fn settle<C, E, S>(consumer: &C, mut entry: E, requeue_delay: Duration, shutdown: S)
where
    C: Consumer + Sync,
    E: RawQueueEntry + Send,
    S: Future<Output = ()> + Send,
{
    let frame = NotificationFrame::new(entry.payload(), entry.delivery_count());
    let disposition = consumer.consume(frame).await;

    let result = match disposition {
        Disposition::Acknowledge => entry.acknowledge().await,
        Disposition::Requeue => {
            let delay = requeue_delay
                .saturating_mul(entry.delivery_count())
                .min(MAX_REQUEUE_DELAY);

            // Shutdown cuts the backoff short
            tokio::select! {
                _ = sleep(delay) => {},
                _ = shutdown => {},
            }

            entry.requeue().await
        }
    };

    if let Err(error) = result {
        warn!(?disposition, %error, "Failed to settle notification");
    }
}
