//! Table sinks
//!
//! A sink appends enriched rows to an existing table. It never creates the
//! table and never truncates it: [`TableSink::ensure_ready`] fails when the
//! table is absent or its columns cannot hold the rows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SinkError;
use crate::record::EnrichedAssetRecord;

pub mod memory;
pub mod postgres;

pub use memory::MemoryTableSink;
pub use postgres::PostgresTableSink;

#[async_trait]
pub trait TableSink: Send + Sync {
    fn table(&self) -> &TableRef;

    /// Confirm the table exists and accepts enriched rows
    async fn ensure_ready(&self) -> Result<(), SinkError>;

    /// Append all rows as one unit. Returns the number of rows written.
    async fn append(&self, rows: &[EnrichedAssetRecord]) -> Result<u64, SinkError>;
}

/// Target table, written `project:dataset.table` or `dataset.table`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub project: Option<String>,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn parse(raw: &str) -> Result<Self, SinkError> {
        let invalid = || SinkError::InvalidTable(raw.to_string());

        let (project, rest) = match raw.split_once(':') {
            Some((project, rest)) => (Some(project), rest),
            None => (None, raw),
        };
        let (dataset, table) = rest.split_once('.').ok_or_else(invalid)?;

        let parts = project.into_iter().chain([dataset, table]);
        for part in parts {
            if !is_identifier(part) {
                return Err(invalid());
            }
        }

        Ok(Self {
            project: project.map(str::to_string),
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }

    /// `"dataset"."table"`, the dataset mapped to a schema
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.dataset), quote_ident(&self.table))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(project) = &self.project {
            write!(f, "{}:", project)?;
        }
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

fn is_identifier(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
