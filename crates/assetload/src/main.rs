//! Assetload - load one asset CSV into the warehouse

use anyhow::{Context, Result};
use assetload::config::{ConfigOverrides, JobConfig, RunnerKind};
use assetload::job::BatchJob;
use assetload::sink::PostgresTableSink;
use assetload::storage::S3Storage;
use assetload_common::logging::{init_logging, LogConfig, LogLevel};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "assetload")]
#[command(author, version, about = "Load an asset CSV from object storage into a warehouse table")]
struct Cli {
    /// Source object, e.g. gs://bucket/input/asset.csv
    #[arg(short, long)]
    input: Option<String>,

    /// Where the source goes after a successful load
    #[arg(short, long)]
    processed: Option<String>,

    /// Target table, project:dataset.table
    #[arg(short, long)]
    table: Option<String>,

    /// Execution engine: direct or worker-pool
    #[arg(short, long)]
    runner: Option<RunnerKind>,

    /// Concurrent bundles for the worker-pool engine
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(long)]
    job_name: Option<String>,

    /// Abort the load if it has not finished after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Do not read the processed copy back before deleting the source
    #[arg(long)]
    no_verify_copy: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            runner: self.runner,
            job_name: self.job_name.clone(),
            input_file: self.input.clone(),
            processed_file: self.processed.clone(),
            table: self.table.clone(),
            workers: self.workers,
            timeout_secs: self.timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("assetload")
        .filter_directives("sqlx=warn,aws_config=warn,aws_smithy_runtime=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let mut config = JobConfig::from_env().context("Failed to load configuration")?;
    config.apply(cli.overrides());
    config.validate().context("Invalid configuration")?;

    info!(
        "Configuration loaded - {} -> {} via {} runner",
        config.pipeline.input_file, config.pipeline.table, config.pipeline.runner
    );

    let store = Arc::new(S3Storage::new(config.storage.clone()).await);

    let sink = PostgresTableSink::connect(
        &config.database,
        config.pipeline.table_ref()?,
        config.pipeline.insert_batch_size,
    )
    .await
    .context("Failed to connect to the warehouse")?;

    let mut job = BatchJob::from_options(&config.pipeline, store, Arc::new(sink))?;
    if cli.no_verify_copy {
        job = job.without_copy_verification();
    }

    let token = job.cancellation_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling job");
            token.cancel();
        }
    });

    let report = job.run().await?;

    info!(
        job = %report.job_name,
        state = %report.state,
        lines = report.lines_read,
        rows = report.records_written,
        bundles = report.bundles,
        sha256 = %report.source_sha256,
        "Load complete in {:?}",
        report.elapsed
    );

    Ok(())
}
