//! Batch job driver
//!
//! A [`BatchJob`] runs one source file through the pipeline exactly once:
//!
//! 1. Read the source object and split it into data lines (header dropped).
//! 2. Confirm the target table exists and fits the rows.
//! 3. Transform every line and append all rows through the execution engine.
//! 4. Only after the append succeeded, move the source to the processed
//!    location.
//!
//! Cancellation and the optional timeout cover step 3 up to the moment the
//! table write starts. An interrupt that lands before then fails the job with
//! the table untouched and no move. Once the write has started it is allowed
//! to finish: a commit cannot be recalled, and reporting a committed write as
//! cancelled would leave the source in place for a rerun to append again. A
//! write that finishes after an interrupt is followed by the move as usual.

use assetload_common::checksum;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::{PipelineOptions, RunnerKind};
use crate::engine::{
    asset_stage, BatchExecutor, DirectRunner, ExecutionReport, RecordStage, WorkerPoolRunner,
};
use crate::error::{ConfigError, JobError, SinkError, StorageError};
use crate::mover::FileMover;
use crate::reader;
use crate::record::EnrichedAssetRecord;
use crate::sink::{TableRef, TableSink};
use crate::storage::{ObjectLocation, ObjectStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    /// Rows appended and source moved
    Committed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Committed => "COMMITTED",
            JobState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Summary of a committed run
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_name: String,
    pub runner: &'static str,
    pub state: JobState,
    pub input: String,
    pub processed: String,
    pub table: String,
    pub lines_read: usize,
    pub records_written: u64,
    pub bundles: usize,
    pub source_sha256: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

pub struct BatchJob {
    name: String,
    input: ObjectLocation,
    processed: ObjectLocation,
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn TableSink>,
    executor: Arc<dyn BatchExecutor>,
    mover: FileMover,
    stage: RecordStage,
    timeout: Option<Duration>,
    cancel: CancellationToken,
    state: JobState,
}

impl BatchJob {
    pub fn new(
        name: impl Into<String>,
        input: ObjectLocation,
        processed: ObjectLocation,
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn TableSink>,
        executor: Arc<dyn BatchExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            input,
            processed,
            mover: FileMover::new(Arc::clone(&store)),
            store,
            sink,
            executor,
            stage: asset_stage(),
            timeout: None,
            cancel: CancellationToken::new(),
            state: JobState::Pending,
        }
    }

    /// Build a job from validated pipeline options
    pub fn from_options(
        options: &PipelineOptions,
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn TableSink>,
    ) -> Result<Self, ConfigError> {
        let (input, processed) = options.locations()?;

        let executor: Arc<dyn BatchExecutor> = match options.runner {
            RunnerKind::Direct => Arc::new(DirectRunner::new()),
            RunnerKind::WorkerPool => {
                Arc::new(WorkerPoolRunner::new(options.workers, options.bundle_size))
            },
        };

        info!(
            project = %options.project,
            region = %options.region,
            temp_location = %options.temp_location,
            staging_location = %options.staging_location,
            "Configured job {} with {} runner",
            options.job_name,
            executor.name()
        );

        let mut job = Self::new(
            options.job_name.clone(),
            input,
            processed,
            store,
            sink,
            executor,
        );
        job.timeout = options.timeout();
        Ok(job)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Replace the per-line transform
    pub fn with_stage(mut self, stage: RecordStage) -> Self {
        self.stage = stage;
        self
    }

    pub fn without_copy_verification(mut self) -> Self {
        self.mover = self.mover.without_verification();
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the job. A job runs at most once; later calls fail with
    /// [`JobError::InvalidState`].
    #[instrument(skip(self), fields(job = %self.name))]
    pub async fn run(&mut self) -> Result<JobReport, JobError> {
        if self.state != JobState::Pending {
            return Err(JobError::InvalidState(self.state));
        }
        self.state = JobState::Running;
        let started_at = Utc::now();
        let started = Instant::now();

        info!(
            "Job {} started: {} -> {} -> {}",
            self.name,
            self.input,
            self.sink.table(),
            self.processed
        );

        match self.execute().await {
            Ok((execution, source_sha256)) => {
                self.state = JobState::Committed;
                let report = JobReport {
                    job_name: self.name.clone(),
                    runner: self.executor.name(),
                    state: self.state,
                    input: self.input.to_string(),
                    processed: self.processed.to_string(),
                    table: self.sink.table().to_string(),
                    lines_read: execution.lines_read,
                    records_written: execution.records_written,
                    bundles: execution.bundles,
                    source_sha256,
                    started_at,
                    elapsed: started.elapsed(),
                };
                info!(
                    "Job {} committed {} rows in {:?}",
                    self.name, report.records_written, report.elapsed
                );
                Ok(report)
            },
            Err(e) => {
                self.state = JobState::Failed;
                error!("Job {} failed: {}", self.name, e);
                Err(e)
            },
        }
    }

    async fn execute(&self) -> Result<(ExecutionReport, String), JobError> {
        if self.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let bytes = self.store.get(&self.input).await?;
        let source_sha256 = checksum::sha256_hex(&bytes);
        let text = String::from_utf8(bytes).map_err(|e| StorageError::Unreadable {
            uri: self.input.to_string(),
            reason: e.to_string(),
        })?;

        let lines = reader::data_lines(&text);
        info!("Read {} data lines from {}", lines.len(), self.input);

        self.sink.ensure_ready().await?;

        let fence = WriteFence::new(self.sink.as_ref());
        let execution = self
            .guarded(
                self.executor.execute(lines, Arc::clone(&self.stage), &fence),
                &fence,
            )
            .await?;

        self.mover
            .relocate(&self.input, &self.processed, Some(&source_sha256))
            .await?;

        Ok((execution, source_sha256))
    }

    /// Race `work` against cancellation and the timeout, if any. An interrupt
    /// only wins while the table write has not started.
    async fn guarded<F>(&self, work: F, fence: &WriteFence<'_>) -> Result<ExecutionReport, JobError>
    where
        F: Future<Output = Result<ExecutionReport, JobError>>,
    {
        tokio::pin!(work);

        let deadline = async {
            match self.timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                },
                None => std::future::pending().await,
            }
        };

        let interrupted = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => JobError::Cancelled,
            limit = deadline => JobError::TimedOut(limit),
            result = &mut work => return result,
        };

        if fence.write_started() {
            warn!(
                "{} after the write to {} started, letting it finish",
                interrupted,
                self.sink.table()
            );
            return work.await;
        }

        Err(interrupted)
    }
}

/// Sink wrapper that records when the engine starts the table write
struct WriteFence<'a> {
    inner: &'a dyn TableSink,
    started: AtomicBool,
}

impl<'a> WriteFence<'a> {
    fn new(inner: &'a dyn TableSink) -> Self {
        Self {
            inner,
            started: AtomicBool::new(false),
        }
    }

    fn write_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<'a> TableSink for WriteFence<'a> {
    fn table(&self) -> &TableRef {
        self.inner.table()
    }

    async fn ensure_ready(&self) -> Result<(), SinkError> {
        self.inner.ensure_ready().await
    }

    async fn append(&self, rows: &[EnrichedAssetRecord]) -> Result<u64, SinkError> {
        // One scheduling point before the fence closes, so an interrupt
        // raised during the transform is still seen.
        tokio::task::yield_now().await;
        self.started.store(true, Ordering::SeqCst);
        self.inner.append(rows).await
    }
}
