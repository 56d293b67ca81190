use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::{run_stage, write_rows, BatchExecutor, ExecutionReport, RecordStage};
use crate::error::JobError;
use crate::record::EnrichedAssetRecord;
use crate::sink::TableSink;

type BundleResult = (usize, Result<Vec<EnrichedAssetRecord>, JobError>);

/// Bundled parallel engine.
///
/// Lines are cut into bundles of `bundle_size`. At most `workers` bundles are
/// in flight at once, each transformed on a blocking thread. The first failed
/// bundle aborts the rest and the sink is never called.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolRunner {
    workers: usize,
    bundle_size: usize,
}

impl WorkerPoolRunner {
    pub fn new(workers: usize, bundle_size: usize) -> Self {
        Self {
            workers: workers.max(1),
            bundle_size: bundle_size.max(1),
        }
    }

    fn spawn_bundle(
        &self,
        tasks: &mut JoinSet<BundleResult>,
        stage: &RecordStage,
        index: usize,
        bundle: Vec<String>,
    ) {
        let stage = Arc::clone(stage);
        let offset = index * self.bundle_size;

        debug!("Dispatching bundle {} ({} lines)", index, bundle.len());
        tasks.spawn_blocking(move || (index, run_stage(&stage, &bundle, offset)));
    }
}

#[async_trait]
impl BatchExecutor for WorkerPoolRunner {
    fn name(&self) -> &'static str {
        "worker-pool"
    }

    #[instrument(
        skip_all,
        fields(runner = "worker-pool", workers = self.workers, lines = lines.len())
    )]
    async fn execute(
        &self,
        lines: Vec<String>,
        stage: RecordStage,
        sink: &dyn TableSink,
    ) -> Result<ExecutionReport, JobError> {
        let lines_read = lines.len();
        let bundles: Vec<Vec<String>> = lines
            .chunks(self.bundle_size)
            .map(<[String]>::to_vec)
            .collect();
        let bundle_count = bundles.len();

        info!("Processing {} lines in {} bundles", lines_read, bundle_count);

        let mut outputs: Vec<Option<Vec<EnrichedAssetRecord>>> = vec![None; bundle_count];
        let mut queue = bundles.into_iter().enumerate();
        let mut tasks = JoinSet::new();

        for (index, bundle) in queue.by_ref().take(self.workers) {
            self.spawn_bundle(&mut tasks, &stage, index, bundle);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(rows))) => {
                    debug!("Bundle {} produced {} rows", index, rows.len());
                    outputs[index] = Some(rows);

                    if let Some((next, bundle)) = queue.next() {
                        self.spawn_bundle(&mut tasks, &stage, next, bundle);
                    }
                },
                Ok((index, Err(e))) => {
                    warn!("Bundle {} failed, aborting remaining bundles: {}", index, e);
                    tasks.abort_all();
                    return Err(e);
                },
                Err(join_err) => {
                    tasks.abort_all();
                    return Err(JobError::Engine(format!("bundle task failed: {join_err}")));
                },
            }
        }

        let rows: Vec<EnrichedAssetRecord> = outputs.into_iter().flatten().flatten().collect();
        let records_written = write_rows(sink, &rows).await?;

        Ok(ExecutionReport {
            lines_read,
            records_written,
            bundles: bundle_count,
        })
    }
}
