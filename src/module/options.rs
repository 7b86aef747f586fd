//! Various options usable by modules
//!
//! The structs in this module allow other modules to flatten them into
//! their own options struct. This allows for a unified yet non-cluttered
//! option set.

use crate::library::helpers::parse_seconds;
use std::time::Duration;
use structopt::StructOpt;

/// Options for locating the message bus
#[derive(Debug, StructOpt)]
pub struct BusOptions {
    /// Message bus endpoints, the first reachable one is used
    #[structopt(
        long = "discovery",
        env = "DISCOVERY_ENDPOINTS",
        default_value = "redis://localhost:6379/",
        use_delimiter = true,
        value_name = "url"
    )]
    pub endpoints: Vec<String>,
}

/// Options relevant for message queueing
#[derive(Debug, StructOpt)]
pub struct QueueingOptions {
    /// Topic carrying the object storage notifications
    #[structopt(long, env, default_value = "minio")]
    pub topic: String,

    /// Consumer group shared by all dispatcher instances
    #[structopt(long, env = "CONSUMER_GROUP", default_value = "ocrsuper")]
    pub group: String,

    /// Unique and stable identifier for this instance.
    /// It is used to identify and resume work after a crash
    /// or deliberate restart, thus it may not change across
    /// executions!
    #[structopt(long, env = "CONSUMER_ID")]
    pub id: String,

    /// Maximum number of notifications processed concurrently
    #[structopt(long, env, default_value = "200")]
    pub max_in_flight: usize,

    /// Time in seconds granted to in-flight notifications on shutdown.
    /// Omitting it waits for all of them to finish
    #[structopt(long, env, parse(try_from_str = parse_seconds), value_name = "seconds")]
    pub drain_timeout: Option<Duration>,

    /// Seconds a failed notification is held back per previous delivery before it is requeued
    #[structopt(long, env, default_value = "1", parse(try_from_str = parse_seconds), value_name = "seconds")]
    pub requeue_delay: Duration,
}
