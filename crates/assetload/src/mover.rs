//! Post-commit file relocation
//!
//! Moves the processed source object out of the input location: a
//! server-side copy to the processed location, an optional checksum
//! comparison, then a delete of the source. Object stores have no rename,
//! so the move is two calls and can stop halfway; that case is reported as
//! [`StorageError::PartialMove`] with both objects left in place.

use assetload_common::checksum;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::error::StorageError;
use crate::storage::{ObjectLocation, ObjectStore};

pub struct FileMover {
    store: Arc<dyn ObjectStore>,
    verify_copy: bool,
}

impl FileMover {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            verify_copy: true,
        }
    }

    /// Skip reading the copy back before the source is deleted
    pub fn without_verification(mut self) -> Self {
        self.verify_copy = false;
        self
    }

    /// Copy `source` to `destination`, then delete `source`.
    ///
    /// `expected_sha256` is the digest of the source as it was read. When it is
    /// given and verification is on, the copy is read back and compared before
    /// anything is deleted.
    #[instrument(skip(self, expected_sha256), fields(source = %source, destination = %destination))]
    pub async fn relocate(
        &self,
        source: &ObjectLocation,
        destination: &ObjectLocation,
        expected_sha256: Option<&str>,
    ) -> Result<(), StorageError> {
        self.store.copy(source, destination).await?;

        if self.verify_copy {
            if let Some(expected) = expected_sha256 {
                let copied = self.store.get(destination).await?;
                checksum::verify_sha256(&copied, expected).map_err(|e| {
                    StorageError::Verification {
                        source_uri: source.to_string(),
                        destination: destination.to_string(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }

        if let Err(e) = self.store.delete(source).await {
            error!(
                "Copied {} to {} but could not delete the source: {}",
                source, destination, e
            );
            return Err(StorageError::PartialMove {
                source_uri: source.to_string(),
                destination: destination.to_string(),
                reason: e.to_string(),
            });
        }

        info!("Moved {} to {}", source, destination);
        Ok(())
    }
}
