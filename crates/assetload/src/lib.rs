//! Assetload Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch loader for asset CSV files.
//!
//! # Overview
//!
//! One run takes a single asset CSV from object storage, enriches every row
//! with a minimum down payment, appends the rows to an existing warehouse
//! table and then moves the source to a processed location:
//!
//! - **Reader**: drops the first physical line, reinserts a fixed header
//! - **Transform**: `MINIMUM_DOWN_PAYMENT = round(ASSET_VALUE * 0.10, 2)`
//!   in exact decimal arithmetic
//! - **Engines**: sequential or bundled worker-pool execution
//! - **Sink**: append-only writes to a table that must already exist
//! - **Mover**: copy then delete, only after the rows are committed
//!
//! # Example
//!
//! ```no_run
//! use assetload::config::JobConfig;
//! use assetload::job::BatchJob;
//! use assetload::sink::PostgresTableSink;
//! use assetload::storage::S3Storage;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = JobConfig::from_env()?;
//!     config.validate()?;
//!
//!     let store = Arc::new(S3Storage::new(config.storage.clone()).await);
//!     let sink = PostgresTableSink::connect(
//!         &config.database,
//!         config.pipeline.table_ref()?,
//!         config.pipeline.insert_batch_size,
//!     )
//!     .await?;
//!
//!     let mut job = BatchJob::from_options(&config.pipeline, store, Arc::new(sink))?;
//!     let report = job.run().await?;
//!     println!("{} rows written", report.records_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod mover;
pub mod reader;
pub mod record;
pub mod sink;
pub mod storage;
pub mod transform;

pub use error::{ConfigError, JobError, ParseError, SinkError, StorageError};
pub use job::{BatchJob, JobReport, JobState};
pub use record::{AssetRecord, EnrichedAssetRecord};
