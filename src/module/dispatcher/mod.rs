//! Module creating OCR workloads for objects uploaded to the object storage
//!
//! Notifications are consumed from a Redis stream, filtered for object creations and
//! translated into Kubernetes Jobs. See [`DispatchService`] for the per-notification logic.

use crate::harness::{Module, ShutdownSignal};
use crate::library::communication::event::ConsumerExt;
use crate::library::communication::implementation::redis::{RedisFactory, RedisQueueProvider};
use crate::library::EmptyResult;
use async_trait::async_trait;
use futures::FutureExt;
use std::convert::TryFrom;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

mod config;
mod options;
mod services;
mod submitter;

pub use config::{ConfigError, DispatcherConfig};
pub use options::Options;
pub use services::{
    DispatchOutcome, DispatchPolicy, DispatchService, SubmitFailurePolicy, UnknownPolicyError,
};
pub use submitter::{KubernetesSubmitter, SubmitError, WorkloadSubmitter};

#[derive(Debug, Error)]
enum DispatcherError {
    #[error("run loop entered before connections were established")]
    NotConnected,
}

struct Connections {
    factory: RedisFactory,
    submitter: Arc<KubernetesSubmitter>,
}

/// Module implementation
pub struct Dispatcher {
    config: DispatcherConfig,
    connections: Option<Connections>,
}

impl Dispatcher {
    /// Creates a new instance from command line options, validating them in the process
    pub fn new(options: Options) -> Result<Self, ConfigError> {
        Ok(Self {
            config: DispatcherConfig::try_from(options)?,
            connections: None,
        })
    }
}

#[async_trait]
impl Module for Dispatcher {
    #[instrument(skip(self))]
    async fn pre_startup(&mut self) -> EmptyResult {
        let factory = RedisFactory::discover(&self.config.discovery_endpoints).await?;
        let submitter = KubernetesSubmitter::connect(self.config.kubeconfig.as_deref()).await?;

        let template = &self.config.template;
        info!(
            namespace = %template.namespace,
            image = %template.image,
            storage_secret = %template.storage_secret,
            seafile_token_secret = %template.seafile_token_secret,
            naming = ?template.naming,
            "Connected to Kubernetes"
        );

        self.connections = Some(Connections {
            factory,
            submitter: Arc::new(submitter),
        });

        Ok(())
    }

    #[instrument(skip(self, shutdown))]
    async fn run(&mut self, shutdown: ShutdownSignal) -> EmptyResult {
        let connections = self
            .connections
            .as_ref()
            .ok_or(DispatcherError::NotConnected)?;

        let subscription = &self.config.subscription;
        let provider = RedisQueueProvider::new(connections.factory.clone());
        let service = DispatchService::new(
            self.config.template.clone(),
            self.config.policy.clone(),
            connections.submitter.clone(),
        );

        info!(
            topic = subscription.queue.key(),
            group = subscription.group.identifier(),
            consumer = %subscription.consumer,
            max_in_flight = subscription.max_in_flight,
            "Awaiting notifications"
        );

        service
            .consume_queue(&provider, subscription, shutdown.map(|_| ()))
            .await
    }
}
