//! Object storage event notifications as published by MinIO compatible servers

use crate::constants::EVENT_OBJECT_CREATED_PUT;
use crate::library::helpers::split_at_last;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Error raised when a payload does not match the notification shape
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not well-formed JSON or lacks required fields
    #[error("malformed notification payload")]
    Malformed(#[from] serde_json::Error),
}

/// Object key which does not consist of a bucket and an object name
#[derive(Debug, Error, PartialEq, Eq)]
#[error("object key '{0}' is not of the form <bucket>/<object>")]
pub struct InvalidKeyError(String);

/// Kind of event a notification announces
///
/// Every variant except [`ObjectCreatedPut`](EventKind::ObjectCreatedPut) retains the verbatim event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Object has been uploaded with a single PUT request
    ObjectCreatedPut,
    /// Object has been created in any other way (copy, POST, multipart completion)
    ObjectCreated(String),
    /// Object or delete marker has been removed
    ObjectRemoved(String),
    /// Object has been read or its metadata has been queried
    ObjectAccessed(String),
    /// Replication status of an object changed
    Replication(String),
    /// Event name not known to the dispatcher
    Unknown(String),
}

impl EventKind {
    /// Classifies a provider event name
    pub fn from_name(name: &str) -> Self {
        let name_owned = name.to_owned();

        if name == EVENT_OBJECT_CREATED_PUT {
            EventKind::ObjectCreatedPut
        } else if name.starts_with("s3:ObjectCreated:") {
            EventKind::ObjectCreated(name_owned)
        } else if name.starts_with("s3:ObjectRemoved:") {
            EventKind::ObjectRemoved(name_owned)
        } else if name.starts_with("s3:ObjectAccessed:") {
            EventKind::ObjectAccessed(name_owned)
        } else if name.starts_with("s3:Replication:") {
            EventKind::Replication(name_owned)
        } else {
            EventKind::Unknown(name_owned)
        }
    }

    /// Event name as emitted by the provider
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::ObjectCreatedPut => EVENT_OBJECT_CREATED_PUT,
            EventKind::ObjectCreated(name)
            | EventKind::ObjectRemoved(name)
            | EventKind::ObjectAccessed(name)
            | EventKind::Replication(name)
            | EventKind::Unknown(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of an object, split at the last path separator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    bucket: String,
    object: String,
}

impl ObjectKey {
    /// Splits a `<bucket>/<object>` key at its last separator
    ///
    /// Any nested prefix becomes part of the bucket, so `a/b/c.pdf` refers to object `c.pdf` in `a/b`.
    pub fn parse(key: &str) -> Result<Self, InvalidKeyError> {
        match split_at_last(key, "/") {
            Some((bucket, object)) if !bucket.is_empty() && !object.is_empty() => {
                Ok(Self { bucket, object })
            }
            _ => Err(InvalidKeyError(key.to_owned())),
        }
    }

    /// Parent part of the key
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Leaf part of the key
    pub fn object(&self) -> &str {
        &self.object
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.object)
    }
}

#[derive(Deserialize)]
struct RawNotification {
    #[serde(rename = "EventName")]
    event_name: String,
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Records", default)]
    records: Option<Vec<Record>>,
}

/// Decoded object storage event
///
/// The key is kept verbatim. Its shape only matters once a workload is built from it,
/// see [`object_key`](Notification::object_key).
#[derive(Debug, Clone)]
pub struct Notification {
    kind: EventKind,
    key: String,
    records: Vec<Record>,
}

impl Notification {
    /// Parses a raw bus payload
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawNotification = serde_json::from_slice(payload)?;

        Ok(Self {
            kind: EventKind::from_name(&raw.event_name),
            key: raw.key,
            records: raw.records.unwrap_or_default(),
        })
    }

    /// Whether the notification should result in a workload
    pub fn is_actionable(&self) -> bool {
        self.kind == EventKind::ObjectCreatedPut
    }

    /// Kind of event
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Key of the affected object as announced by the provider
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Bucket and object name of the affected object
    pub fn object_key(&self) -> Result<ObjectKey, InvalidKeyError> {
        ObjectKey::parse(&self.key)
    }

    /// Provider metadata attached to the event
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Time at which the event occurred according to the first record, if present
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        self.records.iter().find_map(|record| record.event_time)
    }
}

/// Provider metadata of a single event record
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    pub event_version: Option<String>,
    pub event_source: Option<String>,
    pub aws_region: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    pub event_name: Option<String>,
    pub user_identity: Option<Identity>,
    pub request_parameters: Option<RequestParameters>,
    pub response_elements: Option<HashMap<String, String>>,
    pub s3: Option<StorageEntity>,
    pub source: Option<Source>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    pub principal_id: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestParameters {
    pub principal_id: Option<String>,
    pub region: Option<String>,
    #[serde(rename = "sourceIPAddress")]
    pub source_ip_address: Option<String>,
}

/// Bucket and object details of a record
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageEntity {
    pub s3_schema_version: Option<String>,
    pub configuration_id: Option<String>,
    pub bucket: Option<BucketDetails>,
    pub object: Option<ObjectDetails>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BucketDetails {
    pub name: Option<String>,
    pub owner_identity: Option<Identity>,
    pub arn: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectDetails {
    pub key: Option<String>,
    pub size: Option<u64>,
    pub e_tag: Option<String>,
    pub content_type: Option<String>,
    pub user_metadata: Option<HashMap<String, String>>,
    pub sequencer: Option<String>,
}

/// Client which caused the event
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Source {
    pub host: Option<String>,
    pub port: Option<String>,
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod does {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const MINIO_PAYLOAD: &str = r#"{
        "EventName": "s3:ObjectCreated:Put",
        "Key": "ftpserver/CCE29012021.pdf",
        "Records": [
            {
                "eventVersion": "2.0",
                "eventSource": "minio:s3",
                "awsRegion": "",
                "eventTime": "2021-05-14T09:53:18.659Z",
                "eventName": "s3:ObjectCreated:Put",
                "userIdentity": { "principalId": "x" },
                "requestParameters": { "principalId": "x", "region": "", "sourceIPAddress": "10.42.3.0" },
                "responseElements": {
                    "content-length": "0",
                    "x-amz-request-id": "167EE62D33977CB0",
                    "x-minio-deployment-id": "f419d854-d8c2-4ba7-999c-91584753b8c4",
                    "x-minio-origin-endpoint": "http://10.42.3.47:9000"
                },
                "s3": {
                    "s3SchemaVersion": "1.0",
                    "configurationId": "Config",
                    "bucket": { "name": "ftpserver", "ownerIdentity": { "principalId": "x" }, "arn": "arn:aws:s3:::ftpserver" },
                    "object": {
                        "key": "CCE29012021.pdf",
                        "size": 515320,
                        "eTag": "b713d89260bb82d400710bc141e9bfd7",
                        "contentType": "application/pdf",
                        "userMetadata": { "content-type": "application/pdf" },
                        "sequencer": "167EE62D6C014045"
                    }
                },
                "source": { "host": "10.42.3.0", "port": "", "userAgent": "aws-sdk-go/1.37.19 (go1.16; linux; amd64) S3Manager" }
            }
        ]
    }"#;

    fn decode(payload: &str) -> Result<Notification, DecodeError> {
        Notification::decode(payload.as_bytes())
    }

    #[test]
    fn decode_minio_notification() {
        let notification = decode(MINIO_PAYLOAD).unwrap();

        assert_eq!(notification.kind(), &EventKind::ObjectCreatedPut);
        assert_eq!(notification.key(), "ftpserver/CCE29012021.pdf");

        let key = notification.object_key().unwrap();
        assert_eq!(key.bucket(), "ftpserver");
        assert_eq!(key.object(), "CCE29012021.pdf");
        assert_eq!(
            notification.event_time(),
            Some(Utc.with_ymd_and_hms(2021, 5, 14, 9, 53, 18).unwrap() + chrono::Duration::milliseconds(659))
        );

        let object = notification.records()[0]
            .s3
            .as_ref()
            .and_then(|s3| s3.object.as_ref())
            .unwrap();

        assert_eq!(object.size, Some(515320));
        assert_eq!(object.e_tag.as_deref(), Some("b713d89260bb82d400710bc141e9bfd7"));
    }

    #[test]
    fn decode_without_records() {
        let notification = decode(r#"{"EventName":"s3:ObjectCreated:Put","Key":"a/b"}"#).unwrap();
        assert!(notification.records().is_empty());
        assert_eq!(notification.event_time(), None);

        let notification =
            decode(r#"{"EventName":"s3:ObjectCreated:Put","Key":"a/b","Records":null}"#).unwrap();
        assert!(notification.records().is_empty());
    }

    #[test]
    fn retain_unknown_event_kinds() {
        let notification = decode(r#"{"EventName":"s3:BucketCreated","Key":"a/b"}"#).unwrap();

        assert_eq!(
            notification.kind(),
            &EventKind::Unknown("s3:BucketCreated".into())
        );
        assert_eq!(notification.kind().to_string(), "s3:BucketCreated");
        assert!(!notification.is_actionable());
    }

    #[test]
    fn reject_malformed_payloads() {
        let payloads = [
            "",
            "not json",
            r#"{"EventName":"s3:ObjectCreated:Put","Key":"ftpserver/rep"#,
            r#"{"Key":"ftpserver/report.pdf"}"#,
            r#"{"EventName":"s3:ObjectCreated:Put"}"#,
            r#"{"EventName":42,"Key":"ftpserver/report.pdf"}"#,
            r#"{"EventName":"s3:ObjectCreated:Put","Key":["ftpserver"]}"#,
            r#"{"EventName":"s3:ObjectCreated:Put","Key":"a/b","Records":{}}"#,
            r#"{"EventName":"s3:ObjectCreated:Put","Key":"a/b","Records":[{"eventTime":"yesterday"}]}"#,
        ];

        for payload in payloads {
            assert!(
                matches!(decode(payload), Err(DecodeError::Malformed(_))),
                "accepted {:?}",
                payload
            );
        }
    }

    #[test]
    fn decode_keys_without_bucket_or_object() {
        for key in ["report.pdf", "/report.pdf", "ftpserver/scans/", ""] {
            let payload = format!(r#"{{"EventName":"s3:ObjectCreated:Put","Key":"{}"}}"#, key);
            let notification = decode(&payload).unwrap();

            assert_eq!(notification.key(), key);
            assert_eq!(
                notification.object_key(),
                Err(InvalidKeyError(key.to_owned()))
            );
        }
    }

    #[test]
    fn split_key_at_last_separator() {
        let key = ObjectKey::parse("ftpserver/scans/2021/CCE29012021.pdf").unwrap();

        assert_eq!(key.bucket(), "ftpserver/scans/2021");
        assert_eq!(key.object(), "CCE29012021.pdf");
        assert_eq!(key.to_string(), "ftpserver/scans/2021/CCE29012021.pdf");
    }

    #[test]
    fn only_act_on_put_creations() {
        let cases = [
            ("s3:ObjectCreated:Put", true),
            ("s3:ObjectCreated:Copy", false),
            ("s3:ObjectCreated:Post", false),
            ("s3:ObjectCreated:CompleteMultipartUpload", false),
            ("s3:ObjectRemoved:Delete", false),
            ("s3:ObjectRemoved:DeleteMarkerCreated", false),
            ("s3:ObjectAccessed:Get", false),
            ("s3:ObjectAccessed:Head", false),
            ("s3:Replication:OperationFailedReplication", false),
            ("s3:ObjectCreated:Put ", false),
            ("", false),
        ];

        for (name, actionable) in cases {
            let payload = format!(r#"{{"EventName":"{}","Key":"a/b"}}"#, name);
            let notification = decode(&payload).unwrap();

            assert_eq!(notification.is_actionable(), actionable, "{}", name);
            assert_eq!(notification.kind().as_str(), name);
        }
    }
}
