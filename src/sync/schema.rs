// ABOUTME: Schema introspection for table sync - reads column lists and DDL from the source
// ABOUTME: Produces validated table descriptors used to build per-table SQL

use anyhow::{anyhow, bail, Context, Result};

use super::connection::SourceConnection;
use super::error::SyncError;
use crate::utils::validate_mysql_identifier;

/// Column conventionally holding the per-row change-timestamp.
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "time_stamp";

/// Shape of a source table, derived fresh on every run.
///
/// Every name in a descriptor has passed [`validate_mysql_identifier`], so it is
/// safe to interpolate into generated SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    /// Set only when the table has the change-timestamp column. Tables without
    /// it always full-sync.
    pub change_column: Option<String>,
}

impl TableDescriptor {
    pub fn new(name: &str, columns: Vec<String>, timestamp_column: &str) -> Result<Self> {
        validate_mysql_identifier(name).context("Invalid table name")?;
        if columns.is_empty() {
            bail!("Table {} has no columns", name);
        }
        for column in &columns {
            validate_mysql_identifier(column)
                .with_context(|| format!("Invalid column name in table {}", name))?;
        }

        let change_column = columns
            .iter()
            .find(|c| c.as_str() == timestamp_column)
            .cloned();

        Ok(Self {
            name: name.to_string(),
            columns,
            change_column,
        })
    }

    /// Position of the change-timestamp column within [`Self::columns`].
    pub fn change_column_index(&self) -> Option<usize> {
        let change_column = self.change_column.as_deref()?;
        self.columns.iter().position(|c| c == change_column)
    }

    pub fn supports_incremental(&self) -> bool {
        self.change_column.is_some()
    }
}

/// A descriptor plus the DDL needed to recreate the table.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    pub descriptor: TableDescriptor,
    pub ddl: String,
}

/// Read the column list and `CREATE TABLE` statement for `table`.
///
/// Fails with [`SyncError::Schema`] if the table is missing or introspection
/// queries cannot run.
pub async fn introspect_table<S>(
    source: &mut S,
    table: &str,
    timestamp_column: &str,
) -> Result<TableDefinition, SyncError>
where
    S: SourceConnection + ?Sized,
{
    let schema_error = |err: anyhow::Error| SyncError::Schema {
        table: table.to_string(),
        source: err,
    };

    let columns = source
        .describe_columns(table)
        .await
        .map_err(schema_error)?;
    if columns.is_empty() {
        return Err(schema_error(anyhow!("Table {} does not exist in source", table)));
    }

    let descriptor =
        TableDescriptor::new(table, columns, timestamp_column).map_err(schema_error)?;

    let ddl = source
        .show_create_table(table)
        .await
        .map_err(schema_error)?;
    if ddl.trim().is_empty() {
        return Err(schema_error(anyhow!("Source returned empty DDL for {}", table)));
    }

    if descriptor.change_column.is_none() {
        tracing::warn!(
            "Table {} has no {} column; it will be fully synced on every run",
            table,
            timestamp_column
        );
    }

    Ok(TableDefinition { descriptor, ddl })
}
