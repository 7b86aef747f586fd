//! Constant values shared across the crate

/// Event name emitted by the object storage when an object has been uploaded with a single PUT request
pub const EVENT_OBJECT_CREATED_PUT: &str = "s3:ObjectCreated:Put";

/// Label marking every workload created by this dispatcher
pub const WORKLOAD_APP_LABEL: &str = "app";
/// Value of the [`WORKLOAD_APP_LABEL`]
pub const WORKLOAD_APP_NAME: &str = "s3ocr";
/// Label carrying the bucket from which the processed object originates, sanitized to a valid label value
pub const WORKLOAD_BUCKET_LABEL: &str = "s3ocr.dispatcher/bucket";
/// Annotation carrying the unmodified bucket of the processed object
pub const WORKLOAD_BUCKET_ANNOTATION: &str = "s3ocr.dispatcher/bucket";
/// Annotation carrying the name of the processed object
pub const WORKLOAD_OBJECT_ANNOTATION: &str = "s3ocr.dispatcher/object";

/// Prefix of all generated workload names
pub const WORKLOAD_NAME_PREFIX: &str = "ocrfile";
/// Name of the single container within a workload
pub const WORKLOAD_CONTAINER_NAME: &str = "s3ocr";

/// Environment variable through which the worker receives the storage secret key
pub const ENV_STORAGE_SECRET: &str = "S3_SECRET";
/// Environment variable through which the worker receives the downstream server token
pub const ENV_SEAFILE_TOKEN: &str = "SEAFILE_TOKEN";
