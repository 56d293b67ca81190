//! Execution engines
//!
//! An engine takes the data lines of one source, applies the per-line record
//! stage to every line and hands the complete result to the sink in a single
//! append. Nothing reaches the sink unless every line transformed cleanly.
//!
//! - [`DirectRunner`] works through the lines in order on the calling task.
//! - [`WorkerPoolRunner`] splits the lines into bundles and transforms up to
//!   `workers` bundles at once on blocking threads. Row order in the output
//!   still follows line order.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{JobError, ParseError};
use crate::reader;
use crate::record::EnrichedAssetRecord;
use crate::sink::TableSink;

pub mod direct;
pub mod worker_pool;

pub use direct::DirectRunner;
pub use worker_pool::WorkerPoolRunner;

/// Per-line transform applied by an engine
pub type RecordStage =
    Arc<dyn Fn(&str) -> Result<Vec<EnrichedAssetRecord>, ParseError> + Send + Sync>;

/// The standard stage: reinsert the header, parse, enrich
pub fn asset_stage() -> RecordStage {
    Arc::new(crate::transform::enrich_line)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub lines_read: usize,
    pub records_written: u64,
    pub bundles: usize,
}

#[async_trait]
pub trait BatchExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        lines: Vec<String>,
        stage: RecordStage,
        sink: &dyn TableSink,
    ) -> Result<ExecutionReport, JobError>;
}

/// Apply `stage` to `lines`, where `lines[0]` is data line number `offset`.
pub(crate) fn run_stage(
    stage: &RecordStage,
    lines: &[String],
    offset: usize,
) -> Result<Vec<EnrichedAssetRecord>, JobError> {
    let mut rows = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let parsed = stage(line.as_str()).map_err(|source| JobError::Parse {
            line: reader::physical_line(offset + i),
            source,
        })?;
        rows.extend(parsed);
    }
    Ok(rows)
}

pub(crate) async fn write_rows(
    sink: &dyn TableSink,
    rows: &[EnrichedAssetRecord],
) -> Result<u64, JobError> {
    if rows.is_empty() {
        debug!("No rows to write to {}", sink.table());
        return Ok(0);
    }

    let written = sink.append(rows).await?;
    info!("Wrote {} rows to {}", written, sink.table());
    Ok(written)
}
