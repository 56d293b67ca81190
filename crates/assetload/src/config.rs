//! Job configuration
//!
//! Every recognized option lives in [`JobConfig`]. Values come from the
//! environment (a `.env` file is honoured), the binary may override a few of
//! them from flags, and [`JobConfig::validate`] rejects the result before any
//! storage or database connection is opened.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::sink::TableRef;
use crate::storage::config::StorageConfig;
use crate::storage::location::ObjectLocation;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_JOB_NAME: &str = "asset-csv-to-table";

pub const DEFAULT_REGION: &str = "us-central1";

/// Concurrent transform tasks for the worker-pool runner.
pub const DEFAULT_WORKERS: usize = 4;

/// Lines per bundle handed to one worker.
pub const DEFAULT_BUNDLE_SIZE: usize = 500;

/// Rows per INSERT statement.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 500;

pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/warehouse";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Postgres caps a statement at 65535 bind parameters; each row binds one per column.
pub const MAX_INSERT_BATCH_SIZE: usize = 65535 / crate::record::OUTPUT_COLUMNS.len();

// ============================================================================
// Option enums
// ============================================================================

/// Which execution engine runs the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RunnerKind {
    /// Single task, one line after another
    Direct,
    /// Bundles transformed concurrently on the tokio runtime
    #[default]
    WorkerPool,
}

impl FromStr for RunnerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" | "directrunner" => Ok(RunnerKind::Direct),
            "worker-pool" | "worker_pool" | "workerpool" | "workerpoolrunner" => {
                Ok(RunnerKind::WorkerPool)
            },
            other => Err(format!("unknown runner {other:?}, expected direct or worker-pool")),
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerKind::Direct => write!(f, "direct"),
            RunnerKind::WorkerPool => write!(f, "worker-pool"),
        }
    }
}

/// What happens to rows already in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    #[default]
    WriteAppend,
    WriteTruncate,
    WriteEmpty,
}

impl FromStr for WriteDisposition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "WRITE_APPEND" | "APPEND" => Ok(WriteDisposition::WriteAppend),
            "WRITE_TRUNCATE" | "TRUNCATE" => Ok(WriteDisposition::WriteTruncate),
            "WRITE_EMPTY" | "EMPTY" => Ok(WriteDisposition::WriteEmpty),
            other => Err(format!("unknown write disposition {other:?}")),
        }
    }
}

/// Whether a missing table may be created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateDisposition {
    #[default]
    CreateNever,
    CreateIfNeeded,
}

impl FromStr for CreateDisposition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CREATE_NEVER" | "NEVER" => Ok(CreateDisposition::CreateNever),
            "CREATE_IF_NEEDED" | "IF_NEEDED" => Ok(CreateDisposition::CreateIfNeeded),
            other => Err(format!("unknown create disposition {other:?}")),
        }
    }
}

// ============================================================================
// Config structs
// ============================================================================

/// Everything one run needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub pipeline: PipelineOptions,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
}

/// Pipeline options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub runner: RunnerKind,
    pub project: String,
    pub region: String,
    pub job_name: String,
    /// Scratch space for the execution engine
    pub temp_location: String,
    /// Staging space for the execution engine
    pub staging_location: String,
    /// Object to load
    pub input_file: String,
    /// Where the object goes once its rows are committed
    pub processed_file: String,
    /// `project:dataset.table` or `dataset.table`
    pub table: String,
    pub write_disposition: WriteDisposition,
    pub create_disposition: CreateDisposition,
    pub workers: usize,
    pub bundle_size: usize,
    pub insert_batch_size: usize,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Values supplied on the command line. `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub runner: Option<RunnerKind>,
    pub job_name: Option<String>,
    pub input_file: Option<String>,
    pub processed_file: Option<String>,
    pub table: Option<String>,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
}

// ============================================================================
// Loading
// ============================================================================

/// Typed access to a key/value source, normally the process environment
pub(crate) struct EnvSource<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> EnvSource<'a> {
    pub(crate) fn new(lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { lookup }
    }

    /// Trimmed value; blank counts as unset
    pub(crate) fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub(crate) fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    pub(crate) fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.parsed_optional(key)?.unwrap_or(default))
    }

    pub(crate) fn parsed_optional<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.optional(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| ConfigError::invalid(key, format!("{raw:?}: {e}")))
            })
            .transpose()
    }
}

impl JobConfig {
    /// Read configuration from the process environment, after loading `.env`
    /// if one exists. The result is not validated yet.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration from an arbitrary key/value source.
    ///
    /// Keys: `ASSETLOAD_RUNNER`, `ASSETLOAD_PROJECT`, `ASSETLOAD_REGION`,
    /// `ASSETLOAD_JOB_NAME`, `ASSETLOAD_TEMP_LOCATION`,
    /// `ASSETLOAD_STAGING_LOCATION`, `ASSETLOAD_INPUT_FILE`,
    /// `ASSETLOAD_PROCESSED_FILE`, `ASSETLOAD_TABLE`,
    /// `ASSETLOAD_WRITE_DISPOSITION`, `ASSETLOAD_CREATE_DISPOSITION`,
    /// `ASSETLOAD_WORKERS`, `ASSETLOAD_BUNDLE_SIZE`,
    /// `ASSETLOAD_INSERT_BATCH_SIZE`, `ASSETLOAD_TIMEOUT_SECS`, the
    /// `DATABASE_*` pool settings and the `S3_*` storage settings.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource::new(&lookup);

        let pipeline = PipelineOptions {
            runner: env.parsed("ASSETLOAD_RUNNER", RunnerKind::default())?,
            project: env.required("ASSETLOAD_PROJECT")?,
            region: env
                .optional("ASSETLOAD_REGION")
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            job_name: env
                .optional("ASSETLOAD_JOB_NAME")
                .unwrap_or_else(|| DEFAULT_JOB_NAME.to_string()),
            temp_location: env.required("ASSETLOAD_TEMP_LOCATION")?,
            staging_location: env.required("ASSETLOAD_STAGING_LOCATION")?,
            input_file: env.required("ASSETLOAD_INPUT_FILE")?,
            processed_file: env.required("ASSETLOAD_PROCESSED_FILE")?,
            table: env.required("ASSETLOAD_TABLE")?,
            write_disposition: env
                .parsed("ASSETLOAD_WRITE_DISPOSITION", WriteDisposition::default())?,
            create_disposition: env
                .parsed("ASSETLOAD_CREATE_DISPOSITION", CreateDisposition::default())?,
            workers: env.parsed("ASSETLOAD_WORKERS", DEFAULT_WORKERS)?,
            bundle_size: env.parsed("ASSETLOAD_BUNDLE_SIZE", DEFAULT_BUNDLE_SIZE)?,
            insert_batch_size: env
                .parsed("ASSETLOAD_INSERT_BATCH_SIZE", DEFAULT_INSERT_BATCH_SIZE)?,
            timeout_secs: env.parsed_optional("ASSETLOAD_TIMEOUT_SECS")?,
        };

        let database = DatabaseConfig {
            url: env
                .optional("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            max_connections: env
                .parsed("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS)?,
            min_connections: env
                .parsed("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS)?,
            connect_timeout_secs: env
                .parsed("DATABASE_CONNECT_TIMEOUT", DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS)?,
        };

        Ok(Self {
            pipeline,
            database,
            storage: StorageConfig::from_source(&env)?,
        })
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        let pipeline = &mut self.pipeline;

        if let Some(runner) = overrides.runner {
            pipeline.runner = runner;
        }
        if let Some(job_name) = overrides.job_name {
            pipeline.job_name = job_name;
        }
        if let Some(input_file) = overrides.input_file {
            pipeline.input_file = input_file;
        }
        if let Some(processed_file) = overrides.processed_file {
            pipeline.processed_file = processed_file;
        }
        if let Some(table) = overrides.table {
            pipeline.table = table;
        }
        if let Some(workers) = overrides.workers {
            pipeline.workers = workers;
        }
        if overrides.timeout_secs.is_some() {
            pipeline.timeout_secs = overrides.timeout_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        self.database.validate()?;
        self.storage.validate()
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.trim().is_empty() {
            return Err(ConfigError::Missing("ASSETLOAD_PROJECT"));
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::invalid("ASSETLOAD_REGION", "region cannot be empty"));
        }
        validate_job_name(&self.job_name)?;

        validate_prefix("ASSETLOAD_TEMP_LOCATION", &self.temp_location)?;
        validate_prefix("ASSETLOAD_STAGING_LOCATION", &self.staging_location)?;

        let (input, processed) = self.locations()?;
        if input == processed {
            return Err(ConfigError::invalid(
                "ASSETLOAD_PROCESSED_FILE",
                "processed location must differ from the input location",
            ));
        }
        if input.scheme != processed.scheme {
            return Err(ConfigError::invalid(
                "ASSETLOAD_PROCESSED_FILE",
                "input and processed locations must be in the same storage system",
            ));
        }

        self.table_ref()?;

        if self.write_disposition != WriteDisposition::WriteAppend {
            return Err(ConfigError::invalid(
                "ASSETLOAD_WRITE_DISPOSITION",
                "only WRITE_APPEND is supported",
            ));
        }
        if self.create_disposition != CreateDisposition::CreateNever {
            return Err(ConfigError::invalid(
                "ASSETLOAD_CREATE_DISPOSITION",
                "only CREATE_NEVER is supported; the table must already exist",
            ));
        }

        if self.workers == 0 {
            return Err(ConfigError::invalid("ASSETLOAD_WORKERS", "must be greater than 0"));
        }
        if self.bundle_size == 0 {
            return Err(ConfigError::invalid("ASSETLOAD_BUNDLE_SIZE", "must be greater than 0"));
        }
        if self.insert_batch_size == 0 || self.insert_batch_size > MAX_INSERT_BATCH_SIZE {
            return Err(ConfigError::invalid(
                "ASSETLOAD_INSERT_BATCH_SIZE",
                format!("must be between 1 and {MAX_INSERT_BATCH_SIZE}"),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::invalid(
                "ASSETLOAD_TIMEOUT_SECS",
                "must be greater than 0 when set",
            ));
        }

        Ok(())
    }

    /// Parsed input and processed locations
    pub fn locations(&self) -> Result<(ObjectLocation, ObjectLocation), ConfigError> {
        let input = ObjectLocation::parse(&self.input_file)
            .map_err(|e| ConfigError::invalid("ASSETLOAD_INPUT_FILE", e.to_string()))?;
        let processed = ObjectLocation::parse(&self.processed_file)
            .map_err(|e| ConfigError::invalid("ASSETLOAD_PROCESSED_FILE", e.to_string()))?;
        Ok((input, processed))
    }

    pub fn table_ref(&self) -> Result<TableRef, ConfigError> {
        TableRef::parse(&self.table)
            .map_err(|e| ConfigError::invalid("ASSETLOAD_TABLE", e.to_string()))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("postgres://") || self.url.starts_with("postgresql://")) {
            return Err(ConfigError::invalid("DATABASE_URL", "expected a postgres:// URL"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::invalid(
                "DATABASE_MAX_CONNECTIONS",
                "must be greater than 0",
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::invalid(
                "DATABASE_MIN_CONNECTIONS",
                format!(
                    "{} cannot be greater than max_connections ({})",
                    self.min_connections, self.max_connections
                ),
            ));
        }
        Ok(())
    }
}

/// Lowercase letters, digits and hyphens, starting with a letter
fn validate_job_name(name: &str) -> Result<(), ConfigError> {
    let starts_with_letter = name.chars().next().is_some_and(|c| c.is_ascii_lowercase());
    let allowed = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if starts_with_letter && allowed && !name.ends_with('-') {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            "ASSETLOAD_JOB_NAME",
            format!("{name:?} must be lowercase letters, digits and hyphens, starting with a letter"),
        ))
    }
}

/// A bucket prefix such as `gs://bucket/temp`
fn validate_prefix(name: &'static str, uri: &str) -> Result<(), ConfigError> {
    let rest = uri
        .strip_prefix("gs://")
        .or_else(|| uri.strip_prefix("s3://"))
        .ok_or_else(|| ConfigError::invalid(name, format!("{uri:?} is not a gs:// or s3:// URI")))?;

    let bucket = rest.split('/').next().unwrap_or_default();
    if bucket.is_empty() {
        return Err(ConfigError::invalid(name, format!("{uri:?} has no bucket")));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<String, String> {
        [
            ("ASSETLOAD_PROJECT", "asset-project"),
            ("ASSETLOAD_TEMP_LOCATION", "gs://asset-bucket/temp"),
            ("ASSETLOAD_STAGING_LOCATION", "gs://asset-bucket/staging"),
            ("ASSETLOAD_INPUT_FILE", "gs://asset-bucket/input/asset.csv"),
            ("ASSETLOAD_PROCESSED_FILE", "gs://asset-bucket/processed/asset.csv"),
            ("ASSETLOAD_TABLE", "asset-project:dp_dataset.asset"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn load(vars: &HashMap<String, String>) -> Result<JobConfig, ConfigError> {
        JobConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&base_vars()).unwrap();
        let p = &config.pipeline;

        assert_eq!(p.runner, RunnerKind::WorkerPool);
        assert_eq!(p.region, DEFAULT_REGION);
        assert_eq!(p.job_name, DEFAULT_JOB_NAME);
        assert_eq!(p.write_disposition, WriteDisposition::WriteAppend);
        assert_eq!(p.create_disposition, CreateDisposition::CreateNever);
        assert_eq!(p.workers, DEFAULT_WORKERS);
        assert_eq!(p.timeout(), None);
        assert_eq!(config.database.url, DEFAULT_DATABASE_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_required_setting() {
        let mut vars = base_vars();
        vars.remove("ASSETLOAD_TABLE");
        assert_eq!(load(&vars).unwrap_err(), ConfigError::Missing("ASSETLOAD_TABLE"));

        let mut vars = base_vars();
        vars.insert("ASSETLOAD_INPUT_FILE".to_string(), "   ".to_string());
        assert_eq!(load(&vars).unwrap_err(), ConfigError::Missing("ASSETLOAD_INPUT_FILE"));
    }

    #[test]
    fn test_unparseable_values_fail_fast() {
        let mut vars = base_vars();
        vars.insert("ASSETLOAD_WORKERS".to_string(), "many".to_string());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "ASSETLOAD_WORKERS", .. })
        ));

        let mut vars = base_vars();
        vars.insert("ASSETLOAD_RUNNER".to_string(), "DataflowRunner".to_string());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "ASSETLOAD_RUNNER", .. })
        ));
    }

    #[test]
    fn test_runner_names() {
        assert_eq!("DirectRunner".parse::<RunnerKind>().unwrap(), RunnerKind::Direct);
        assert_eq!("worker_pool".parse::<RunnerKind>().unwrap(), RunnerKind::WorkerPool);
        assert_eq!(RunnerKind::WorkerPool.to_string(), "worker-pool");
    }

    #[test]
    fn test_only_append_and_never_create_accepted() {
        let mut vars = base_vars();
        vars.insert("ASSETLOAD_WRITE_DISPOSITION".to_string(), "WRITE_TRUNCATE".to_string());
        let config = load(&vars).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "ASSETLOAD_WRITE_DISPOSITION", .. })
        ));

        let mut vars = base_vars();
        vars.insert("ASSETLOAD_CREATE_DISPOSITION".to_string(), "create_if_needed".to_string());
        let config = load(&vars).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "ASSETLOAD_CREATE_DISPOSITION", .. })
        ));
    }

    #[test]
    fn test_locations_validated() {
        let mut config = load(&base_vars()).unwrap();
        config.pipeline.processed_file = config.pipeline.input_file.clone();
        assert!(config.validate().is_err());

        let mut config = load(&base_vars()).unwrap();
        config.pipeline.processed_file = "s3://other/processed/asset.csv".to_string();
        assert!(config.validate().is_err());

        let mut config = load(&base_vars()).unwrap();
        config.pipeline.input_file = "/tmp/asset.csv".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "ASSETLOAD_INPUT_FILE", .. })
        ));

        let mut config = load(&base_vars()).unwrap();
        config.pipeline.temp_location = "gs:///temp".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_limits_validated() {
        let mut config = load(&base_vars()).unwrap();
        config.pipeline.workers = 0;
        assert!(config.validate().is_err());

        let mut config = load(&base_vars()).unwrap();
        config.pipeline.insert_batch_size = MAX_INSERT_BATCH_SIZE + 1;
        assert!(config.validate().is_err());

        let mut config = load(&base_vars()).unwrap();
        config.pipeline.timeout_secs = Some(0);
        assert!(config.validate().is_err());

        let mut config = load(&base_vars()).unwrap();
        config.database.min_connections = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_job_name_rules() {
        assert!(validate_job_name("asset-csv-to-table").is_ok());
        assert!(validate_job_name("Asset").is_err());
        assert!(validate_job_name("1asset").is_err());
        assert!(validate_job_name("asset_load").is_err());
        assert!(validate_job_name("asset-").is_err());
        assert!(validate_job_name("").is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = load(&base_vars()).unwrap();
        config.apply(ConfigOverrides {
            runner: Some(RunnerKind::Direct),
            input_file: Some("gs://asset-bucket/input/other.csv".to_string()),
            timeout_secs: Some(30),
            ..ConfigOverrides::default()
        });

        assert_eq!(config.pipeline.runner, RunnerKind::Direct);
        assert_eq!(config.pipeline.input_file, "gs://asset-bucket/input/other.csv");
        assert_eq!(config.pipeline.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.pipeline.table, "asset-project:dp_dataset.asset");
    }
}
