// ABOUTME: MySQL destination connection - provisions tables, upserts rows, keeps sync_status
// ABOUTME: Transactions are driven explicitly so a multi-batch write commits as one unit

use anyhow::{Context, Result};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Value};

use super::sql;
use crate::sync::connection::{DestinationConnection, Row};
use crate::sync::state::{SyncStatusRecord, CONTROL_TABLE};
use crate::sync::watermark::Watermark;
use crate::sync::writer::UpsertPlan;

/// Read-write view of the destination database.
pub struct MySqlDestination {
    conn: Conn,
    /// Fractional digits of `sync_status.last_sync`, looked up on first write
    watermark_precision: Option<u32>,
}

impl MySqlDestination {
    pub fn new(conn: Conn) -> Self {
        Self {
            conn,
            watermark_precision: None,
        }
    }

    /// A control table created as plain `TIMESTAMP` rounds fractional seconds
    /// on insert, which could push the watermark past unsynced rows.
    async fn watermark_precision(&mut self) -> Result<u32> {
        if let Some(digits) = self.watermark_precision {
            return Ok(digits);
        }

        let precision: Option<Option<u32>> = self
            .conn
            .exec_first(sql::WATERMARK_PRECISION, (CONTROL_TABLE,))
            .await
            .context("Failed to read sync_status.last_sync precision")?;
        let digits = precision.flatten().unwrap_or(0);
        if digits < 6 {
            tracing::warn!(
                "sync_status.last_sync has {} fractional digits; watermarks are truncated to match",
                digits
            );
        }

        self.watermark_precision = Some(digits);
        Ok(digits)
    }

    /// All rows of the control table, ordered by table name.
    pub async fn list_sync_status(&mut self) -> Result<Vec<SyncStatusRecord>> {
        let rows: Vec<(String, Option<String>)> = self
            .conn
            .query(sql::list_sync_status())
            .await
            .context("Failed to read sync_status")?;

        Ok(rows
            .into_iter()
            .map(|(table_name, last_sync)| SyncStatusRecord {
                table_name,
                last_sync,
            })
            .collect())
    }
}

#[async_trait]
impl DestinationConnection for MySqlDestination {
    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let count: Option<u64> = self
            .conn
            .exec_first(sql::TABLE_EXISTS, (table,))
            .await
            .with_context(|| format!("Failed to check whether {} exists", table))?;

        Ok(count.unwrap_or(0) > 0)
    }

    async fn execute_ddl(&mut self, ddl: &str) -> Result<()> {
        // DDL commits implicitly in MySQL
        self.conn
            .query_drop(ddl)
            .await
            .context("Failed to execute DDL on destination")
    }

    async fn ensure_control_table(&mut self) -> Result<()> {
        self.conn
            .query_drop(sql::create_control_table())
            .await
            .context("Failed to create sync_status table")
    }

    async fn read_watermark(&mut self, table: &str) -> Result<Option<Watermark>> {
        let value: Option<Value> = self
            .conn
            .exec_first(sql::read_watermark(), (table,))
            .await
            .with_context(|| format!("Failed to read watermark for {}", table))?;

        match value {
            Some(value) => Watermark::from_value(&value)
                .with_context(|| format!("Stored watermark for {} is not a timestamp", table)),
            None => Ok(None),
        }
    }

    async fn write_watermark(&mut self, table: &str, watermark: Watermark) -> Result<()> {
        let watermark = watermark.truncate_to_precision(self.watermark_precision().await?);
        self.conn
            .exec_drop(sql::write_watermark(), (table, watermark.to_value()))
            .await
            .with_context(|| format!("Failed to write watermark for {}", table))
    }

    async fn begin(&mut self) -> Result<()> {
        self.conn
            .query_drop("START TRANSACTION")
            .await
            .context("Failed to start transaction")
    }

    async fn upsert_batch(&mut self, plan: &UpsertPlan, rows: &[Row]) -> Result<u64> {
        let query = sql::upsert_rows(plan, rows.len());
        let params: Vec<Value> = rows.iter().flatten().cloned().collect();

        self.conn
            .exec_drop(query, params)
            .await
            .with_context(|| format!("Failed to upsert batch into {}", plan.table))?;

        Ok(self.conn.affected_rows())
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn
            .query_drop("COMMIT")
            .await
            .context("Failed to commit transaction")
    }

    async fn rollback(&mut self) -> Result<()> {
        self.conn
            .query_drop("ROLLBACK")
            .await
            .context("Failed to roll back transaction")
    }

    fn max_rows_per_statement(&self, columns: usize) -> usize {
        (sql::MAX_PLACEHOLDERS / columns.max(1)).max(1)
    }
}
