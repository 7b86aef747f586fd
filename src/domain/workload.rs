//! Units of work handed to the orchestration substrate

use super::notification::{Notification, ObjectKey};
use crate::constants::{
    ENV_SEAFILE_TOKEN, ENV_STORAGE_SECRET, WORKLOAD_APP_LABEL, WORKLOAD_APP_NAME,
    WORKLOAD_BUCKET_ANNOTATION, WORKLOAD_BUCKET_LABEL, WORKLOAD_NAME_PREFIX,
    WORKLOAD_OBJECT_ANNOTATION,
};
use crate::library::helpers::split_into_two;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const MAX_LABEL_VALUE_LENGTH: usize = 63;

/// Error raised when parsing workload related configuration values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkloadConfigError {
    /// Secret reference is not of the form `name/key`
    #[error("secret reference '{0}' is not of the form <name>/<key>")]
    InvalidSecretReference(String),
    /// Naming strategy is neither `random` nor `deterministic`
    #[error("unknown naming strategy '{0}', expected 'random' or 'deterministic'")]
    UnknownNamingStrategy(String),
}

/// Way in which workload names are generated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingStrategy {
    /// Fresh name on every build, redeliveries create additional workloads
    Random,
    /// Name derived from the object key and event time, redeliveries collide with the existing workload
    Deterministic,
}

impl Default for NamingStrategy {
    fn default() -> Self {
        NamingStrategy::Random
    }
}

impl FromStr for NamingStrategy {
    type Err = WorkloadConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(NamingStrategy::Random),
            "deterministic" => Ok(NamingStrategy::Deterministic),
            _ => Err(WorkloadConfigError::UnknownNamingStrategy(s.to_owned())),
        }
    }
}

/// Reference to a single key within a named cluster secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference {
    name: String,
    key: String,
}

impl SecretReference {
    /// Name of the secret object
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key within the secret
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl FromStr for SecretReference {
    type Err = WorkloadConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match split_into_two(s, "/") {
            Some((name, key)) if !name.is_empty() && !key.is_empty() => Ok(Self { name, key }),
            _ => Err(WorkloadConfigError::InvalidSecretReference(s.to_owned())),
        }
    }
}

impl fmt::Display for SecretReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.key)
    }
}

/// Environment variable resolved from a secret when the workload starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEnvironment {
    /// Name of the variable
    pub variable: String,
    /// Secret key providing the value
    pub secret: SecretReference,
}

/// Image pull policy of a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullPolicy {
    /// Only pull when the image is missing locally
    IfNotPresent,
}

impl PullPolicy {
    /// Value understood by the substrate
    pub fn as_str(&self) -> &'static str {
        match self {
            PullPolicy::IfNotPresent => "IfNotPresent",
        }
    }
}

/// Restart policy of a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Failed workloads are never restarted
    Never,
}

impl RestartPolicy {
    /// Value understood by the substrate
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::Never => "Never",
        }
    }
}

/// Generated identifier of a workload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadName(String);

impl WorkloadName {
    fn random() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    fn derived_from(notification: &Notification) -> Self {
        let seed = match notification.event_time() {
            Some(time) => format!("{}@{}", notification.key(), time.to_rfc3339()),
            None => notification.key().to_string(),
        };

        Self::with_id(Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes()))
    }

    fn with_id(id: Uuid) -> Self {
        Self(format!("{}-{}", WORKLOAD_NAME_PREFIX, id.simple()))
    }

    /// Name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkloadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Complete description of a workload processing a single object
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadDescriptor {
    /// Unique name of the workload
    pub name: WorkloadName,
    /// Namespace the workload is created in
    pub namespace: String,
    /// Container image reference
    pub image: String,
    /// Pull policy for the image
    pub pull_policy: PullPolicy,
    /// Arguments passed to the container
    pub args: Vec<String>,
    /// Environment variables sourced from secrets
    pub environment: Vec<SecretEnvironment>,
    /// Labels attached to the workload
    pub labels: BTreeMap<String, String>,
    /// Annotations attached to the workload
    pub annotations: BTreeMap<String, String>,
    /// Restart policy of the container
    pub restart_policy: RestartPolicy,
    /// Number of retries before the workload is considered failed
    pub backoff_limit: i32,
    /// Retention of the workload after it finished
    pub ttl_after_finished: Duration,
}

/// Static parameters from which descriptors are built
#[derive(Debug, Clone)]
pub struct WorkloadTemplate {
    /// Namespace workloads are created in
    pub namespace: String,
    /// Container image of the worker
    pub image: String,
    /// Object storage endpoint passed to the worker
    pub storage_endpoint: String,
    /// Object storage access key passed to the worker
    pub storage_access_key: String,
    /// Whether the worker talks to the object storage over TLS
    pub storage_use_ssl: bool,
    /// Secret holding the object storage secret key
    pub storage_secret: SecretReference,
    /// URL of the downstream file server
    pub seafile_server: String,
    /// Secret holding the downstream file server token
    pub seafile_token_secret: SecretReference,
    /// Library on the downstream file server
    pub seafile_library_id: String,
    /// Retention of finished workloads
    pub ttl_after_finished: Duration,
    /// Way in which workload names are generated
    pub naming: NamingStrategy,
}

impl WorkloadTemplate {
    /// Builds the descriptor for an actionable notification and its split key
    pub fn build(&self, notification: &Notification, key: &ObjectKey) -> WorkloadDescriptor {
        let name = match self.naming {
            NamingStrategy::Random => WorkloadName::random(),
            NamingStrategy::Deterministic => WorkloadName::derived_from(notification),
        };

        let mut args = vec![
            format!("--endpoint={}", self.storage_endpoint),
            format!("--accesskey={}", self.storage_access_key),
        ];

        if self.storage_use_ssl {
            args.push("--useSSL".to_owned());
        }

        args.extend([
            format!("--bucket={}", key.bucket()),
            format!("--object={}", key.object()),
            format!("--seafileserver={}", self.seafile_server),
            format!("--seafilelibraryid={}", self.seafile_library_id),
        ]);

        let environment = vec![
            SecretEnvironment {
                variable: ENV_STORAGE_SECRET.to_owned(),
                secret: self.storage_secret.clone(),
            },
            SecretEnvironment {
                variable: ENV_SEAFILE_TOKEN.to_owned(),
                secret: self.seafile_token_secret.clone(),
            },
        ];

        let mut labels = BTreeMap::new();
        labels.insert(WORKLOAD_APP_LABEL.to_owned(), WORKLOAD_APP_NAME.to_owned());
        labels.insert(
            WORKLOAD_BUCKET_LABEL.to_owned(),
            label_value(key.bucket()),
        );

        let mut annotations = BTreeMap::new();
        annotations.insert(
            WORKLOAD_BUCKET_ANNOTATION.to_owned(),
            key.bucket().to_owned(),
        );
        annotations.insert(
            WORKLOAD_OBJECT_ANNOTATION.to_owned(),
            key.object().to_owned(),
        );

        WorkloadDescriptor {
            name,
            namespace: self.namespace.clone(),
            image: self.image.clone(),
            pull_policy: PullPolicy::IfNotPresent,
            args,
            environment,
            labels,
            annotations,
            restart_policy: RestartPolicy::Never,
            backoff_limit: 0,
            ttl_after_finished: self.ttl_after_finished,
        }
    }
}

/// Coerces arbitrary input into a valid label value
///
/// Label values are limited to 63 alphanumeric characters, `-`, `_` and `.` and have to
/// begin and end with an alphanumeric character.
fn label_value(input: &str) -> String {
    let sanitized: String = input
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '-',
        })
        .take(MAX_LABEL_VALUE_LENGTH)
        .collect();

    sanitized
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_owned()
}
