//! Object storage access
//!
//! The job only needs three operations on single objects, so the
//! [`ObjectStore`] trait stays that small. [`S3Storage`] talks to S3 and
//! S3-compatible endpoints (GCS interop, MinIO); [`MemoryObjectStore`] keeps
//! objects in memory for tests and dry runs.

use async_trait::async_trait;

use crate::error::StorageError;

pub mod config;
pub mod location;
pub mod memory;
pub mod s3;

pub use config::StorageConfig;
pub use location::{ObjectLocation, Scheme};
pub use memory::{MemoryObjectStore, StoreOp};
pub use s3::S3Storage;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Full contents of an object
    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StorageError>;

    /// Server-side copy; an existing destination is overwritten
    async fn copy(
        &self,
        source: &ObjectLocation,
        destination: &ObjectLocation,
    ) -> Result<(), StorageError>;

    async fn delete(&self, location: &ObjectLocation) -> Result<(), StorageError>;
}
