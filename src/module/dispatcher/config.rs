use super::options::Options;
use super::services::DispatchPolicy;
use crate::domain::WorkloadTemplate;
use crate::library::communication::event::{
    ConsumerGroupDescriptor, QueueDescriptor, Subscription,
};
use std::convert::TryFrom;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration values which are syntactically valid but unusable
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Concurrency limit of zero would never process anything
    #[error("max-in-flight has to be at least 1")]
    NoInFlightCapacity,
    /// No bus endpoint to discover from
    #[error("at least one discovery endpoint is required")]
    NoDiscoveryEndpoints,
    /// Required value has been set to an empty string
    #[error("{0} may not be empty")]
    EmptyValue(&'static str),
}

/// Immutable configuration of the dispatcher, assembled once during startup
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// What to consume and how
    pub subscription: Subscription,
    /// Message bus URLs, tried in order
    pub discovery_endpoints: Vec<String>,
    /// Static parameters of created workloads
    pub template: WorkloadTemplate,
    /// How outcomes translate into settlements
    pub policy: DispatchPolicy,
    /// Explicit kubeconfig location
    pub kubeconfig: Option<PathBuf>,
}

fn require(value: &str, name: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::EmptyValue(name))
    } else {
        Ok(())
    }
}

impl TryFrom<Options> for DispatcherConfig {
    type Error = ConfigError;

    fn try_from(options: Options) -> Result<Self, Self::Error> {
        let Options {
            queueing,
            bus,
            storage,
            seafile,
            workload,
        } = options;

        if queueing.max_in_flight == 0 {
            return Err(ConfigError::NoInFlightCapacity);
        }

        let discovery_endpoints: Vec<String> = bus
            .endpoints
            .into_iter()
            .map(|endpoint| endpoint.trim().to_owned())
            .filter(|endpoint| !endpoint.is_empty())
            .collect();

        if discovery_endpoints.is_empty() {
            return Err(ConfigError::NoDiscoveryEndpoints);
        }

        require(&queueing.topic, "topic")?;
        require(&queueing.group, "group")?;
        require(&queueing.id, "id")?;
        require(&storage.endpoint, "endpoint")?;
        require(&storage.accesskey, "accesskey")?;
        require(&seafile.seafileserver, "seafileserver")?;
        require(&seafile.seafilelibraryid, "seafilelibraryid")?;
        require(&workload.namespace, "namespace")?;
        require(&workload.image, "image")?;

        let subscription = Subscription {
            queue: QueueDescriptor::new(queueing.topic),
            group: ConsumerGroupDescriptor::new(queueing.group),
            consumer: queueing.id,
            max_in_flight: queueing.max_in_flight,
            drain_timeout: queueing.drain_timeout,
            requeue_delay: queueing.requeue_delay,
        };

        let template = WorkloadTemplate {
            namespace: workload.namespace,
            image: workload.image,
            storage_endpoint: storage.endpoint,
            storage_access_key: storage.accesskey,
            storage_use_ssl: !storage.insecure,
            storage_secret: storage.storage_secret,
            seafile_server: seafile.seafileserver,
            seafile_token_secret: seafile.seafile_token_secret,
            seafile_library_id: seafile.seafilelibraryid,
            ttl_after_finished: workload.ttl_after_finished,
            naming: workload.naming,
        };

        let policy = DispatchPolicy {
            on_submit_failure: workload.submit_failure_policy,
            redelivery_limit: Some(workload.redelivery_limit).filter(|limit| *limit > 0),
            submit_timeout: workload.submit_timeout,
        };

        Ok(Self {
            subscription,
            discovery_endpoints,
            template,
            policy,
            kubeconfig: workload.kubeconfig,
        })
    }
}
