//! Shared fixtures for batch job integration tests

#![allow(dead_code)]

use std::sync::Arc;

use assetload::engine::BatchExecutor;
use assetload::job::BatchJob;
use assetload::sink::{MemoryTableSink, TableRef};
use assetload::storage::{MemoryObjectStore, ObjectLocation, StoreOp};

pub const INPUT_URI: &str = "gs://asset-bucket/input/asset.csv";
pub const PROCESSED_URI: &str = "gs://asset-bucket/processed/asset.csv";
pub const TABLE: &str = "asset-project:dp_dataset.asset";

/// Header line as exported upstream; always discarded by the reader
pub const SOURCE_HEADER: &str = "asset_id,asset_type,make,model,year,vin,registration_no,asset_value,status";

pub struct Harness {
    pub store: Arc<MemoryObjectStore>,
    pub sink: Arc<MemoryTableSink>,
    pub input: ObjectLocation,
    pub processed: ObjectLocation,
}

impl Harness {
    pub async fn with_source(content: &str) -> Self {
        Self::with_sink(content, MemoryTableSink::new(table())).await
    }

    pub async fn with_sink(content: &str, sink: MemoryTableSink) -> Self {
        let harness = Self::empty(sink);
        harness
            .store
            .insert(harness.input.clone(), content.as_bytes().to_vec())
            .await;
        harness
    }

    pub fn empty(sink: MemoryTableSink) -> Self {
        Self {
            store: Arc::new(MemoryObjectStore::new()),
            sink: Arc::new(sink),
            input: location(INPUT_URI),
            processed: location(PROCESSED_URI),
        }
    }

    pub fn job(&self, executor: Arc<dyn BatchExecutor>) -> BatchJob {
        BatchJob::new(
            "asset-csv-to-table",
            self.input.clone(),
            self.processed.clone(),
            self.store.clone(),
            self.sink.clone(),
            executor,
        )
    }

    pub async fn source_exists(&self) -> bool {
        self.store.contents(&self.input).await.is_some()
    }

    pub async fn processed_contents(&self) -> Option<Vec<u8>> {
        self.store.contents(&self.processed).await
    }

    /// True when any copy or delete reached the store
    pub async fn mover_ran(&self) -> bool {
        self.store
            .operations()
            .await
            .iter()
            .any(|op| matches!(op, StoreOp::Copy { .. } | StoreOp::Delete(_)))
    }
}

pub fn table() -> TableRef {
    TableRef::parse(TABLE).unwrap()
}

pub fn location(uri: &str) -> ObjectLocation {
    ObjectLocation::parse(uri).unwrap()
}

/// A source file: upstream header followed by `rows`
pub fn source(rows: &[&str]) -> String {
    let mut text = String::from(SOURCE_HEADER);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    text
}

/// `count` valid rows with distinct ids
pub fn numbered_rows(count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| format!("{i},Car,Make{i},Model{i},2020,VIN{i:05},REG{i:05},{i}000.55,ACTIVE"))
        .collect()
}
