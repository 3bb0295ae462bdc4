// ABOUTME: Connection seams between the sync core and a concrete SQL dialect
// ABOUTME: Source is read-only; destination hosts mirrored tables and the sync_status table

use anyhow::Result;
use async_trait::async_trait;
use mysql_async::Value;

use super::schema::TableDescriptor;
use super::watermark::Watermark;
use super::writer::UpsertPlan;

/// One table record, values aligned with [`TableDescriptor::columns`].
pub type Row = Vec<Value>;

/// Read-only access to the source database.
#[async_trait]
pub trait SourceConnection: Send {
    /// Names of all base tables in the source schema.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Column names in ordinal order. Empty if the table does not exist.
    async fn describe_columns(&mut self, table: &str) -> Result<Vec<String>>;

    /// DDL sufficient to recreate the table verbatim.
    async fn show_create_table(&mut self, table: &str) -> Result<String>;

    /// All rows, or only those with change-timestamp strictly greater than `since`.
    async fn fetch_rows(
        &mut self,
        descriptor: &TableDescriptor,
        since: Option<Watermark>,
    ) -> Result<Vec<Row>>;
}

/// Read-write access to the destination database.
#[async_trait]
pub trait DestinationConnection: Send {
    async fn table_exists(&mut self, table: &str) -> Result<bool>;

    /// Execute and commit a DDL statement.
    async fn execute_ddl(&mut self, ddl: &str) -> Result<()>;

    /// Create the sync_status control table if it is missing.
    async fn ensure_control_table(&mut self) -> Result<()>;

    /// `None` when no record exists or the stored timestamp is NULL.
    async fn read_watermark(&mut self, table: &str) -> Result<Option<Watermark>>;

    /// Insert-or-update the record for `table` in its own committed unit.
    /// Never moves a stored watermark backwards.
    async fn write_watermark(&mut self, table: &str, watermark: Watermark) -> Result<()>;

    async fn begin(&mut self) -> Result<()>;

    async fn upsert_batch(&mut self, plan: &UpsertPlan, rows: &[Row]) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Upper bound on rows per upsert statement for a table with `columns` columns.
    fn max_rows_per_statement(&self, _columns: usize) -> usize {
        usize::MAX
    }
}

/// Opens fresh, exclusively-owned connections.
///
/// Every sync task asks for its own pair; connections are released when dropped.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Source: SourceConnection + 'static;
    type Destination: DestinationConnection + 'static;

    async fn connect_source(&self) -> Result<Self::Source>;

    async fn connect_destination(&self) -> Result<Self::Destination>;
}
