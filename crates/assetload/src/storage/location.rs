//! Object URIs: `gs://bucket/key` and `s3://bucket/key`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Gs,
    S3,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Gs => "gs",
            Scheme::S3 => "s3",
        }
    }
}

/// A single object in a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub scheme: Scheme,
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(scheme: Scheme, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            scheme,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse a URI, requiring both a bucket and a non-empty key
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let invalid = |reason: &str| StorageError::InvalidLocation {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = if let Some(rest) = uri.strip_prefix("gs://") {
            (Scheme::Gs, rest)
        } else if let Some(rest) = uri.strip_prefix("s3://") {
            (Scheme::S3, rest)
        } else {
            return Err(invalid("expected a gs:// or s3:// URI"));
        };

        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing object key"))?;

        if bucket.is_empty() {
            return Err(invalid("empty bucket name"));
        }
        if key.is_empty() || key.ends_with('/') {
            return Err(invalid("key must name an object, not a prefix"));
        }

        Ok(Self::new(scheme, bucket, key))
    }

    /// `bucket/key` with the key percent-encoded, as S3 CopySource expects
    pub fn copy_source(&self) -> String {
        let key = self
            .key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.bucket, key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme.as_str(), self.bucket, self.key)
    }
}

impl FromStr for ObjectLocation {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
