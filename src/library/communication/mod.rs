//! Structures to consume event notifications from a message bus
//!
//! Notifications are published by a third party (e.g. an object storage) onto a queue and
//! consumed by interested services in a reliable way. Each delivered entry has to be settled
//! once processing concludes: either it is acknowledged and thus removed from the queue, or it
//! is handed back so that it will be delivered again. Entries that are never settled (e.g.
//! because the process crashed) are redelivered when the consumer resumes.
//!
//! The traits describing this contract live in the [`event`] module while the [`implementation`]
//! module provides backends for them.

pub mod event;
pub mod implementation;
