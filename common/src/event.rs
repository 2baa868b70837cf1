// Storage change events published by the object store's bucket notifications

use crate::errors::EventError;
use serde::{Deserialize, Serialize};

/// Event name MinIO emits when an object is written with a single PUT
pub const OBJECT_CREATED_PUT: &str = "s3:ObjectCreated:Put";

/// The subset of a bucket notification the image checker relies on.
/// `key` is bucket-qualified, e.g. `skilly/pfp/alice`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    #[serde(rename = "EventName")]
    pub event_name: String,
    #[serde(rename = "Key")]
    pub key: String,
}

impl StorageEvent {
    pub fn decode(payload: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(payload).map_err(|e| EventError::Malformed(e.to_string()))
    }

    /// Profile pictures are uploaded through presigned PUT URLs, so only
    /// single-PUT creations are considered fresh uploads.
    pub fn is_object_created(&self) -> bool {
        self.event_name == OBJECT_CREATED_PUT
    }

    /// Bucket-relative object key. Keys without the `<bucket>/` prefix are
    /// returned unchanged.
    pub fn object_key<'a>(&'a self, bucket: &str) -> &'a str {
        self.key
            .strip_prefix(bucket)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(&self.key)
    }
}
