//! Trait implementations using [Redis Streams](https://redis.io/topics/streams-intro)

const STREAM_PAYLOAD_KEY: &str = "payload";
const STREAM_ATTEMPTS_KEY: &str = "attempts";
const STREAM_ID_NEW: &str = "*";
const STREAM_ID_HEAD: &str = "0";
const STREAM_ID_ADDITIONS: &str = ">";

use thiserror::Error;

mod factory;
mod queue_entry;
mod queue_provider;

pub use factory::*;
pub use queue_entry::*;
pub use queue_provider::*;

/// Errors specific to the redis implementation
#[derive(Debug, Error)]
pub enum RedisQueueError {
    /// None of the configured endpoints accepted a connection
    #[error("no reachable redis endpoint among {0:?}")]
    NoReachableEndpoint(Vec<String>),
}
