use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::location::ObjectLocation;
use super::ObjectStore;
use crate::error::StorageError;

/// One call made against a [`MemoryObjectStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Get(ObjectLocation),
    Copy {
        source: ObjectLocation,
        destination: ObjectLocation,
    },
    Delete(ObjectLocation),
}

/// In-memory [`ObjectStore`] with failure injection.
///
/// Every call is recorded, so callers can assert which operations ran and in
/// what order.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<ObjectLocation, Vec<u8>>>,
    operations: RwLock<Vec<StoreOp>>,
    denied_buckets: RwLock<HashSet<String>>,
    fail_deletes: AtomicBool,
    corrupt_copies: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, location: ObjectLocation, data: impl Into<Vec<u8>>) {
        self.objects.write().await.insert(location, data.into());
    }

    pub async fn contents(&self, location: &ObjectLocation) -> Option<Vec<u8>> {
        self.objects.read().await.get(location).cloned()
    }

    pub async fn operations(&self) -> Vec<StoreOp> {
        self.operations.read().await.clone()
    }

    /// Every operation touching this bucket fails with access denied
    pub async fn deny_bucket(&self, bucket: impl Into<String>) {
        self.denied_buckets.write().await.insert(bucket.into());
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Copies write a truncated object at the destination
    pub fn corrupt_copies(&self, corrupt: bool) {
        self.corrupt_copies.store(corrupt, Ordering::SeqCst);
    }

    async fn record(&self, op: StoreOp) {
        self.operations.write().await.push(op);
    }

    async fn check_access(
        &self,
        operation: &'static str,
        location: &ObjectLocation,
    ) -> Result<(), StorageError> {
        if self.denied_buckets.read().await.contains(&location.bucket) {
            return Err(StorageError::AccessDenied {
                operation,
                uri: location.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StorageError> {
        self.record(StoreOp::Get(location.clone())).await;
        self.check_access("get", location).await?;

        self.objects
            .read()
            .await
            .get(location)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(location.to_string()))
    }

    async fn copy(
        &self,
        source: &ObjectLocation,
        destination: &ObjectLocation,
    ) -> Result<(), StorageError> {
        self.record(StoreOp::Copy {
            source: source.clone(),
            destination: destination.clone(),
        })
        .await;
        self.check_access("copy", source).await?;
        self.check_access("copy", destination).await?;

        let mut objects = self.objects.write().await;
        let mut data = objects
            .get(source)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(source.to_string()))?;

        if self.corrupt_copies.load(Ordering::SeqCst) {
            data.truncate(data.len() / 2);
        }

        objects.insert(destination.clone(), data);
        Ok(())
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        self.record(StoreOp::Delete(location.clone())).await;
        self.check_access("delete", location).await?;

        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Request {
                operation: "delete",
                uri: location.to_string(),
                message: "injected delete failure".to_string(),
            });
        }

        self.objects
            .write()
            .await
            .remove(location)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(location.to_string()))
    }
}
