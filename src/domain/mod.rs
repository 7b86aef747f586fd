//! Domain specific data structures
//!
//! Notifications describe what happened in the object storage while workloads describe
//! what the orchestration substrate is asked to do about it.

pub mod notification;
pub mod workload;

pub use notification::{DecodeError, EventKind, InvalidKeyError, Notification, ObjectKey};
pub use workload::{
    NamingStrategy, SecretReference, WorkloadConfigError, WorkloadDescriptor, WorkloadName,
    WorkloadTemplate,
};
