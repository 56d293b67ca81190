use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{TableRef, TableSink};
use crate::error::SinkError;
use crate::record::EnrichedAssetRecord;

/// In-memory [`TableSink`].
///
/// Can pretend the table is missing, reject every append, or stall before
/// writing so that timeouts and cancellation can be exercised.
pub struct MemoryTableSink {
    table: TableRef,
    rows: Mutex<Vec<EnrichedAssetRecord>>,
    exists: bool,
    reject_reason: Option<String>,
    delay: Option<Duration>,
    appends: AtomicUsize,
}

impl MemoryTableSink {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            rows: Mutex::new(Vec::new()),
            exists: true,
            reject_reason: None,
            delay: None,
            appends: AtomicUsize::new(0),
        }
    }

    /// A table that does not exist
    pub fn missing(table: TableRef) -> Self {
        Self {
            exists: false,
            ..Self::new(table)
        }
    }

    /// A table that refuses every append
    pub fn rejecting(table: TableRef, reason: impl Into<String>) -> Self {
        Self {
            reject_reason: Some(reason.into()),
            ..Self::new(table)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn rows(&self) -> Vec<EnrichedAssetRecord> {
        self.rows.lock().await.clone()
    }

    /// Number of append calls, including rejected ones
    pub fn append_calls(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TableSink for MemoryTableSink {
    fn table(&self) -> &TableRef {
        &self.table
    }

    async fn ensure_ready(&self) -> Result<(), SinkError> {
        if self.exists {
            Ok(())
        } else {
            Err(SinkError::TableNotFound(self.table.to_string()))
        }
    }

    async fn append(&self, rows: &[EnrichedAssetRecord]) -> Result<u64, SinkError> {
        self.appends.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = &self.reject_reason {
            return Err(SinkError::Rejected {
                table: self.table.to_string(),
                reason: reason.clone(),
            });
        }
        if !self.exists {
            return Err(SinkError::TableNotFound(self.table.to_string()));
        }

        self.rows.lock().await.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }
}
