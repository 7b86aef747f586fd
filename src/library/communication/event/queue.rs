use crate::library::EmptyResult;
use async_trait::async_trait;

/// Describes a notification queue (usually called a topic on the bus)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDescriptor {
    key: String,
}

impl QueueDescriptor {
    /// Creates a new instance from raw parts
    pub fn new(key: String) -> Self {
        Self { key }
    }

    /// Value which may be used by queue implementations to identify a queue
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Entry retrieved from a [`Queue`](QueueDescriptor) providing a raw payload
///
/// Every entry has to be settled exactly once by calling either [`acknowledge`](RawQueueEntry::acknowledge)
/// or [`requeue`](RawQueueEntry::requeue). Dropping it unsettled leaves it pending on the bus.
#[async_trait]
pub trait RawQueueEntry {
    /// Payload of the item
    fn payload(&self) -> &[u8];

    /// Number of times this item has been delivered, including the current delivery
    fn delivery_count(&self) -> u32;

    /// Acknowledge the item as processed, it will not be delivered again
    async fn acknowledge(&mut self) -> EmptyResult;

    /// Negative-acknowledge the item, requesting that it will be delivered again
    async fn requeue(&mut self) -> EmptyResult;
}
