use super::{SubmitError, WorkloadSubmitter};
use crate::constants::WORKLOAD_CONTAINER_NAME;
use crate::domain::WorkloadDescriptor;
use crate::library::BoxedError;
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, PodSpec, PodTemplateSpec, SecretKeySelector,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::convert::TryFrom;
use std::path::Path;
use tracing::{debug, info};

const REASON_ALREADY_EXISTS: &str = "AlreadyExists";
const STATUS_CONFLICT: u16 = 409;

/// Implementation based on [Kubernetes Jobs](https://kubernetes.io/docs/concepts/workloads/controllers/job/)
#[derive(Clone)]
pub struct KubernetesSubmitter {
    client: Client,
}

impl KubernetesSubmitter {
    /// Connects to the API server described by the given kubeconfig file or, if omitted,
    /// the in-cluster configuration falling back to the default kubeconfig.
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self, BoxedError> {
        let client = match kubeconfig {
            Some(path) => {
                info!(path = %path.display(), "Loading kubeconfig");
                let kubeconfig = Kubeconfig::read_from(path)?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };

        Ok(Self::new(client))
    }

    /// Creates a new instance from an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadSubmitter for KubernetesSubmitter {
    async fn submit(&self, descriptor: &WorkloadDescriptor) -> Result<(), SubmitError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), &descriptor.namespace);
        let job = job_from(descriptor);

        debug!(workload = %descriptor.name, namespace = %descriptor.namespace, "Creating Job");

        api.create(&PostParams::default(), &job)
            .await
            .map(|_| ())
            .map_err(|e| submit_error(e, descriptor))
    }
}

fn submit_error(error: kube::Error, descriptor: &WorkloadDescriptor) -> SubmitError {
    match error {
        kube::Error::Api(response)
            if response.code == STATUS_CONFLICT && response.reason == REASON_ALREADY_EXISTS =>
        {
            SubmitError::AlreadyExists(descriptor.name.to_string())
        }
        kube::Error::Api(response) => SubmitError::Rejected {
            code: response.code,
            reason: response.reason,
            message: response.message,
        },
        other => SubmitError::Transport(other.into()),
    }
}

/// Translates a descriptor into a batch/v1 Job resource
pub(super) fn job_from(descriptor: &WorkloadDescriptor) -> Job {
    let env = descriptor
        .environment
        .iter()
        .map(|entry| EnvVar {
            name: entry.variable.clone(),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: Some(entry.secret.name().to_owned()),
                    key: entry.secret.key().to_owned(),
                    optional: Some(false),
                }),
                ..Default::default()
            }),
        })
        .collect();

    let container = Container {
        name: WORKLOAD_CONTAINER_NAME.to_owned(),
        image: Some(descriptor.image.clone()),
        image_pull_policy: Some(descriptor.pull_policy.as_str().to_owned()),
        args: Some(descriptor.args.clone()),
        env: Some(env),
        ..Default::default()
    };

    let ttl = i32::try_from(descriptor.ttl_after_finished.as_secs()).unwrap_or(i32::MAX);

    Job {
        metadata: ObjectMeta {
            name: Some(descriptor.name.to_string()),
            namespace: Some(descriptor.namespace.clone()),
            labels: Some(descriptor.labels.clone()),
            annotations: Some(descriptor.annotations.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(descriptor.backoff_limit),
            ttl_seconds_after_finished: Some(ttl),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(descriptor.labels.clone()),
                    annotations: Some(descriptor.annotations.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some(descriptor.restart_policy.as_str().to_owned()),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
