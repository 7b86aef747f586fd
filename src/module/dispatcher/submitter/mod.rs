//! Hands workload descriptors to the orchestration substrate

use crate::domain::WorkloadDescriptor;
use crate::library::BoxedError;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

mod kubernetes;

pub use kubernetes::KubernetesSubmitter;

/// Reasons for which a workload could not be created
#[derive(Debug, Error)]
pub enum SubmitError {
    /// A workload with the same name exists already
    #[error("workload {0} already exists")]
    AlreadyExists(String),
    /// Substrate refused the workload
    #[error("substrate rejected workload with {code} {reason}: {message}")]
    Rejected {
        /// HTTP status code
        code: u16,
        /// Machine readable reason
        reason: String,
        /// Human readable explanation
        message: String,
    },
    /// Substrate could not be reached or answered unintelligibly
    #[error("unable to communicate with substrate")]
    Transport(#[source] BoxedError),
    /// Submission did not complete in time
    #[error("submission timed out after {0:?}")]
    Timeout(Duration),
}

/// Client creating workloads
///
/// Implementations are shared by all concurrently running handlers. They must not retry internally.
#[async_trait]
pub trait WorkloadSubmitter {
    /// Creates the described workload
    async fn submit(&self, descriptor: &WorkloadDescriptor) -> Result<(), SubmitError>;
}
