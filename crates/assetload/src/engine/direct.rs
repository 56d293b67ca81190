use async_trait::async_trait;
use tracing::{info, instrument};

use super::{run_stage, write_rows, BatchExecutor, ExecutionReport, RecordStage};
use crate::error::JobError;
use crate::sink::TableSink;

/// Sequential engine for local runs and small files
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectRunner;

impl DirectRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BatchExecutor for DirectRunner {
    fn name(&self) -> &'static str {
        "direct"
    }

    #[instrument(skip_all, fields(runner = "direct", lines = lines.len()))]
    async fn execute(
        &self,
        lines: Vec<String>,
        stage: RecordStage,
        sink: &dyn TableSink,
    ) -> Result<ExecutionReport, JobError> {
        let rows = run_stage(&stage, &lines, 0)?;
        info!("Transformed {} lines into {} rows", lines.len(), rows.len());

        let records_written = write_rows(sink, &rows).await?;

        Ok(ExecutionReport {
            lines_read: lines.len(),
            records_written,
            bundles: usize::from(!lines.is_empty()),
        })
    }
}
