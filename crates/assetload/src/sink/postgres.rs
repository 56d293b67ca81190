use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{quote_ident, TableRef, TableSink};
use crate::config::DatabaseConfig;
use crate::error::SinkError;
use crate::record::{EnrichedAssetRecord, ASSET_VALUE, MINIMUM_DOWN_PAYMENT, OUTPUT_COLUMNS};

/// Appends rows to an existing Postgres table.
///
/// The dataset part of the table reference is the schema. All chunks of one
/// append go through a single transaction, so a rejected chunk leaves the
/// table as it was.
#[derive(Clone)]
pub struct PostgresTableSink {
    pool: PgPool,
    table: TableRef,
    batch_size: usize,
}

impl PostgresTableSink {
    pub fn new(pool: PgPool, table: TableRef, batch_size: usize) -> Self {
        Self {
            pool,
            table,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn connect(
        config: &DatabaseConfig,
        table: TableRef,
        batch_size: usize,
    ) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Database connection pool created"
        );

        Ok(Self::new(pool, table, batch_size))
    }

    fn insert_prefix(&self) -> String {
        let columns = OUTPUT_COLUMNS
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!("INSERT INTO {} ({}) ", self.table.qualified(), columns)
    }

    fn rejected(&self, err: sqlx::Error) -> SinkError {
        match err {
            sqlx::Error::Database(db) => SinkError::Rejected {
                table: self.table.to_string(),
                reason: db.message().to_string(),
            },
            other => SinkError::Database(other),
        }
    }
}

#[async_trait]
impl TableSink for PostgresTableSink {
    fn table(&self) -> &TableRef {
        &self.table
    }

    #[instrument(skip(self), fields(table = %self.table))]
    async fn ensure_ready(&self) -> Result<(), SinkError> {
        let found: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM pg_catalog.pg_class c
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                WHERE n.nspname::text = $1 AND c.relname::text = $2 AND c.relkind IN ('r', 'p')
            )
            "#,
        )
        .bind(&self.table.dataset)
        .bind(&self.table.table)
        .fetch_one(&self.pool)
        .await?;

        if !found {
            return Err(SinkError::TableNotFound(self.table.to_string()));
        }

        let columns: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT column_name::text, data_type::text
            FROM information_schema.columns
            WHERE table_schema::text = $1 AND table_name::text = $2
            "#,
        )
        .bind(&self.table.dataset)
        .bind(&self.table.table)
        .fetch_all(&self.pool)
        .await?;

        check_columns(&self.table, &columns)?;

        debug!("Table {} accepts enriched rows", self.table);
        Ok(())
    }

    #[instrument(skip(self, rows), fields(table = %self.table, rows = rows.len()))]
    async fn append(&self, rows: &[EnrichedAssetRecord]) -> Result<u64, SinkError> {
        if rows.is_empty() {
            debug!("Nothing to append");
            return Ok(0);
        }

        let total_chunks = rows.len().div_ceil(self.batch_size);
        let mut written = 0u64;
        let mut tx = self.pool.begin().await?;

        for (chunk_idx, chunk) in rows.chunks(self.batch_size).enumerate() {
            debug!(
                "Inserting chunk {} / {} ({} rows)",
                chunk_idx + 1,
                total_chunks,
                chunk.len()
            );

            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(self.insert_prefix());
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.asset_id)
                    .push_bind(&row.asset_type)
                    .push_bind(&row.make)
                    .push_bind(&row.model)
                    .push_bind(&row.year)
                    .push_bind(&row.vin)
                    .push_bind(&row.registration_no)
                    .push_bind(&row.asset_value)
                    .push_bind(&row.status)
                    .push_bind(&row.minimum_down_payment);
            });

            let result = query_builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| self.rejected(e))?;
            written += result.rows_affected();
        }

        tx.commit().await.map_err(|e| self.rejected(e))?;

        info!("Appended {} rows to {}", written, self.table);
        Ok(written)
    }
}

/// Every output column must exist; money columns must be `numeric`.
fn check_columns(table: &TableRef, columns: &[(String, String)]) -> Result<(), SinkError> {
    for expected in OUTPUT_COLUMNS {
        let data_type = columns
            .iter()
            .find(|(name, _)| name == expected)
            .map(|(_, data_type)| data_type.as_str())
            .ok_or_else(|| SinkError::SchemaMismatch {
                table: table.to_string(),
                reason: format!("missing column {expected}"),
            })?;

        let is_money = expected == ASSET_VALUE || expected == MINIMUM_DOWN_PAYMENT;
        if is_money && data_type != "numeric" {
            return Err(SinkError::SchemaMismatch {
                table: table.to_string(),
                reason: format!("column {expected} is {data_type}, expected numeric"),
            });
        }
    }
    Ok(())
}
