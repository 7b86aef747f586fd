use super::services::SubmitFailurePolicy;
use crate::domain::{NamingStrategy, SecretReference};
use crate::library::helpers::parse_seconds;
use crate::module::options::{BusOptions, QueueingOptions};
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

/// Options for the dispatcher module
#[derive(Debug, StructOpt)]
pub struct Options {
    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub queueing: QueueingOptions,

    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub bus: BusOptions,

    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub storage: StorageOptions,

    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub seafile: SeafileOptions,

    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub workload: WorkloadOptions,
}

/// Object storage parameters handed to the worker
#[derive(Debug, StructOpt)]
pub struct StorageOptions {
    /// Object storage endpoint the worker downloads from
    #[structopt(long, env = "STORAGE_ENDPOINT")]
    pub endpoint: String,

    /// Object storage access key
    #[structopt(long, env = "STORAGE_ACCESS_KEY")]
    pub accesskey: String,

    /// Talk to the object storage without TLS
    #[structopt(long)]
    pub insecure: bool,

    /// Secret containing the object storage secret key
    #[structopt(long, env = "STORAGE_SECRET_REF", value_name = "name/key")]
    pub storage_secret: SecretReference,
}

/// Downstream file server parameters handed to the worker
#[derive(Debug, StructOpt)]
pub struct SeafileOptions {
    /// URL of the Seafile server receiving the processed documents
    #[structopt(long, env = "SEAFILE_SERVER", value_name = "url")]
    pub seafileserver: String,

    /// Secret containing the Seafile API token
    #[structopt(long, env = "SEAFILE_TOKEN_REF", value_name = "name/key")]
    pub seafile_token_secret: SecretReference,

    /// Library the documents are uploaded to, e.g. 3e040126-4533-4d0c-97f3-baa284915515
    #[structopt(long, env = "SEAFILE_LIBRARY_ID")]
    pub seafilelibraryid: String,
}

/// Shape of the created Kubernetes Jobs and the submission behaviour
#[derive(Debug, StructOpt)]
pub struct WorkloadOptions {
    /// Namespace in which the Jobs are created
    #[structopt(long, env, default_value = "ocr")]
    pub namespace: String,

    /// Container image of the OCR worker
    #[structopt(long, env = "WORKER_IMAGE", default_value = "mschneider82/s3ocr")]
    pub image: String,

    /// Seconds after which finished Jobs are removed
    #[structopt(long, env, default_value = "300", parse(try_from_str = parse_seconds), value_name = "seconds")]
    pub ttl_after_finished: Duration,

    /// Path to a kubeconfig file. Omitting it uses the in-cluster or default configuration
    #[structopt(long, env, parse(from_os_str))]
    pub kubeconfig: Option<PathBuf>,

    /// Strategy for generating Job names, either 'random' or 'deterministic'
    #[structopt(long, env = "WORKLOAD_NAMING", default_value = "random")]
    pub naming: NamingStrategy,

    /// Action taken when a Job could not be created, either 'acknowledge' or 'requeue'
    #[structopt(long, env, default_value = "acknowledge")]
    pub submit_failure_policy: SubmitFailurePolicy,

    /// Number of deliveries after which a notification is no longer requeued but dropped.
    /// Zero disables the limit
    #[structopt(long, env, default_value = "5")]
    pub redelivery_limit: u32,

    /// Seconds after which a Job creation request is considered failed
    #[structopt(long, env, parse(try_from_str = parse_seconds), value_name = "seconds")]
    pub submit_timeout: Option<Duration>,
}
