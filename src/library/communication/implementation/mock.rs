//! In-memory [`QueueProvider`] which records how its entries have been settled
//!
//! Entries that are requeued are delivered again with an incremented delivery count, mimicking
//! the redelivery behaviour of a real bus. It is primarily used for testing consumers.

use crate::library::communication::event::{
    ConsumerGroupDescriptor, QueueDescriptor, QueueProvider, RawQueueEntry,
};
use crate::library::{BoxedError, EmptyResult};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error)]
enum MockQueueError {
    #[error("mock queue has already been consumed")]
    AlreadyConsumed,

    #[error("mock queue has been closed")]
    Closed,
}

/// Way in which a delivered entry has been settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Entry has been acknowledged
    Acknowledged,
    /// Entry has been handed back for redelivery
    Requeued,
}

#[derive(Debug, Clone)]
struct MockMessage {
    id: usize,
    payload: Vec<u8>,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: usize,
    delivered: usize,
    settlements: Vec<(usize, u32, Settlement)>,
}

#[derive(Debug, Default)]
struct MockQueueState {
    ledger: Mutex<Ledger>,
    settled: Notify,
}

impl MockQueueState {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Queue provider backed by an unbounded in-memory channel
///
/// The queue may only be consumed once. It stays open until [`close`](MockQueueProvider::close) is called.
pub struct MockQueueProvider {
    sender: UnboundedSender<MockMessage>,
    receiver: Mutex<Option<UnboundedReceiver<MockMessage>>>,
    state: Arc<MockQueueState>,
}

impl Default for MockQueueProvider {
    fn default() -> Self {
        let (sender, receiver) = unbounded();

        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            state: Arc::new(MockQueueState::default()),
        }
    }
}

impl MockQueueProvider {
    /// Enqueues a new entry and returns its identifier
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> usize {
        let id = {
            let mut ledger = self.state.ledger();
            ledger.next_id += 1;
            ledger.next_id - 1
        };

        let message = MockMessage {
            id,
            payload: payload.into(),
            delivery_count: 1,
        };

        // Publishing to a closed queue silently drops the entry, just like a bus that went away
        self.sender.unbounded_send(message).ok();

        id
    }

    /// Closes the queue, ending the stream once all buffered entries have been delivered
    pub fn close(&self) {
        self.sender.close_channel();
    }

    /// Number of entries (including redeliveries) that have been handed to the consumer
    pub fn delivered(&self) -> usize {
        self.state.ledger().delivered
    }

    /// Settlements of all entries in the order they happened
    pub fn settlements(&self) -> Vec<Settlement> {
        self.state
            .ledger()
            .settlements
            .iter()
            .map(|(_, _, settlement)| *settlement)
            .collect()
    }

    /// Settlements of all deliveries of one entry in the order they happened
    pub fn settlements_of(&self, id: usize) -> Vec<Settlement> {
        self.state
            .ledger()
            .settlements
            .iter()
            .filter(|(entry, _, _)| *entry == id)
            .map(|(_, _, settlement)| *settlement)
            .collect()
    }

    /// Delivery counts reported by each settled delivery of one entry
    pub fn delivery_counts_of(&self, id: usize) -> Vec<u32> {
        self.state
            .ledger()
            .settlements
            .iter()
            .filter(|(entry, _, _)| *entry == id)
            .map(|(_, count, _)| *count)
            .collect()
    }

    /// Future which resolves once at least `count` deliveries have been settled
    pub fn settled(&self, count: usize) -> impl Future<Output = ()> + Send + 'static {
        let state = self.state.clone();

        async move {
            loop {
                let notified = state.settled.notified();
                let done = state.ledger().settlements.len() >= count;

                if done {
                    return;
                }

                notified.await;
            }
        }
    }
}

#[async_trait]
impl QueueProvider for MockQueueProvider {
    type Entry = MockQueueEntry;

    async fn consume(
        &self,
        _queue: &QueueDescriptor,
        _group: &ConsumerGroupDescriptor,
        _consumer: &str,
        _batch_size: usize,
    ) -> Result<BoxStream<'static, Result<Self::Entry, BoxedError>>, BoxedError> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(MockQueueError::AlreadyConsumed)?;

        let sender = self.sender.clone();
        let state = self.state.clone();

        let stream = receiver
            .map(move |message| {
                state.ledger().delivered += 1;

                Ok(MockQueueEntry {
                    message,
                    sender: sender.clone(),
                    state: state.clone(),
                })
            })
            .boxed();

        Ok(stream)
    }
}

/// Entry handed out by the [`MockQueueProvider`]
pub struct MockQueueEntry {
    message: MockMessage,
    sender: UnboundedSender<MockMessage>,
    state: Arc<MockQueueState>,
}

impl MockQueueEntry {
    fn record(&self, settlement: Settlement) {
        self.state.ledger().settlements.push((
            self.message.id,
            self.message.delivery_count,
            settlement,
        ));

        self.state.settled.notify_waiters();
    }
}

#[async_trait]
impl RawQueueEntry for MockQueueEntry {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn delivery_count(&self) -> u32 {
        self.message.delivery_count
    }

    async fn acknowledge(&mut self) -> EmptyResult {
        self.record(Settlement::Acknowledged);
        Ok(())
    }

    async fn requeue(&mut self) -> EmptyResult {
        let redelivery = MockMessage {
            delivery_count: self.message.delivery_count + 1,
            ..self.message.clone()
        };

        self.sender
            .unbounded_send(redelivery)
            .map_err(|_| MockQueueError::Closed)?;

        self.record(Settlement::Requeued);
        Ok(())
    }
}
