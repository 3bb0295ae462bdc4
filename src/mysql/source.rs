// ABOUTME: MySQL source connection - lists tables, reads schema and fetches rows
// ABOUTME: Uses prepared statements so values keep their binary-protocol types

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Params};

use super::sql;
use crate::sync::connection::{Row, SourceConnection};
use crate::sync::schema::TableDescriptor;
use crate::sync::watermark::Watermark;

/// Read-only view of the source database.
pub struct MySqlSource {
    conn: Conn,
}

impl MySqlSource {
    pub fn new(conn: Conn) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SourceConnection for MySqlSource {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let tables: Vec<(String, String)> = self
            .conn
            .query(sql::LIST_TABLES)
            .await
            .context("Failed to list source tables")?;

        Ok(tables.into_iter().map(|(name, _kind)| name).collect())
    }

    async fn describe_columns(&mut self, table: &str) -> Result<Vec<String>> {
        self.conn
            .exec(sql::DESCRIBE_COLUMNS, (table,))
            .await
            .with_context(|| format!("Failed to get columns for {}", table))
    }

    async fn show_create_table(&mut self, table: &str) -> Result<String> {
        let row: Option<(String, String)> = self
            .conn
            .query_first(sql::show_create_table(table))
            .await
            .with_context(|| format!("Failed to read CREATE TABLE for {}", table))?;

        row.map(|(_name, ddl)| ddl)
            .ok_or_else(|| anyhow!("SHOW CREATE TABLE returned nothing for {}", table))
    }

    async fn fetch_rows(
        &mut self,
        descriptor: &TableDescriptor,
        since: Option<Watermark>,
    ) -> Result<Vec<Row>> {
        let query = sql::select_rows(descriptor, since.is_some()).ok_or_else(|| {
            anyhow!(
                "Table {} has no change-timestamp column for incremental sync",
                descriptor.name
            )
        })?;

        let params = match since {
            Some(watermark) => Params::Positional(vec![watermark.to_value()]),
            None => Params::Empty,
        };

        let rows: Vec<mysql_async::Row> = self
            .conn
            .exec(query, params)
            .await
            .with_context(|| format!("Failed to read rows from {}", descriptor.name))?;

        Ok(rows.into_iter().map(mysql_async::Row::unwrap).collect())
    }
}
