//! Structures to realise an event-driven service
//!
//! Notifications are consumed in a reliable and resilient way using a concept called
//! [`ConsumerGroups`](ConsumerGroupDescriptor). Instead of using simple publish subscribe,
//! messages are stored in a log-like data structure on the bus.
//!
//! All notifications have to be settled once processing concludes. Upon crashing, the consumer may then resume from the last settled
//! notification. This ensures that no [`QueueEntries`](RawQueueEntry) are left unprocessed.
//!
//! Multiple consumers may share a [`ConsumerGroup`](ConsumerGroupDescriptor). All participants
//! in a group then collectively process the incoming notification stream where each notification
//! is assigned to only one consumer within the group.

mod consumer;
mod consumer_group;
mod queue;
mod queue_provider;

pub use consumer::*;
pub use consumer_group::*;
pub use queue::*;
pub use queue_provider::*;
