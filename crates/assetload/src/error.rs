//! Error taxonomy for a batch run
//!
//! Each stage has its own error type; [`JobError`] is what the driver
//! returns and what the binary turns into a non-zero exit.

use std::time::Duration;
use thiserror::Error;

use crate::job::JobState;

/// Invalid or missing static settings. Raised before anything is submitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// A single record could not be turned into an enriched row.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed delimited text: {0}")]
    Malformed(String),

    #[error("Record has {found} fields, header has {expected}")]
    TooManyFields { expected: usize, found: usize },

    #[error("Missing field {0}")]
    MissingField(&'static str),

    #[error("Field {field} is not a decimal number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// The target table rejected the batch or could not be reached.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Invalid table identifier {0:?}")]
    InvalidTable(String),

    #[error("Table {0} does not exist and the create disposition is CREATE_NEVER")]
    TableNotFound(String),

    #[error("Table {table} does not accept enriched asset rows: {reason}")]
    SchemaMismatch { table: String, reason: String },

    #[error("Table {table} rejected the write: {reason}")]
    Rejected { table: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Object storage failures: reading the source, copying, deleting.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid object location {uri:?}: {reason}")]
    InvalidLocation { uri: String, reason: String },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied during {operation} on {uri}")]
    AccessDenied { operation: &'static str, uri: String },

    #[error("Object {uri} is unreadable: {reason}")]
    Unreadable { uri: String, reason: String },

    #[error("Storage {operation} failed for {uri}: {message}")]
    Request {
        operation: &'static str,
        uri: String,
        message: String,
    },

    #[error("Copy of {source_uri} to {destination} could not be verified: {reason}")]
    Verification {
        source_uri: String,
        destination: String,
        reason: String,
    },

    /// The copy landed but the source could not be removed. Both objects exist.
    #[error("Partial move: {source_uri} was copied to {destination} but not deleted: {reason}")]
    PartialMove {
        source_uri: String,
        destination: String,
        reason: String,
    },
}

/// Everything that can end a run in the FAILED state.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error at line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: ParseError,
    },

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Execution engine failure: {0}")]
    Engine(String),

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Job timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Job cannot start from state {0}")]
    InvalidState(JobState),
}
