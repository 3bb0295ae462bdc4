// ABOUTME: Sync-state store - per-table watermarks kept in a control table on the destination
// ABOUTME: A missing record means the table was never synced and needs a full sync

use serde::Serialize;

use super::connection::DestinationConnection;
use super::error::SyncError;
use super::watermark::Watermark;

/// Name of the control table holding one watermark row per source table.
pub const CONTROL_TABLE: &str = "sync_status";

/// One row of the control table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatusRecord {
    pub table_name: String,
    /// `None` when the stored timestamp is NULL.
    pub last_sync: Option<String>,
}

/// Reads and writes watermarks through a destination connection.
///
/// Nothing else in the crate touches the control table. Each write is its own
/// committed unit; writes for different tables never contend on the same row.
pub struct SyncStateStore<'a, D: ?Sized> {
    destination: &'a mut D,
}

impl<'a, D> SyncStateStore<'a, D>
where
    D: DestinationConnection + ?Sized,
{
    pub fn new(destination: &'a mut D) -> Self {
        Self { destination }
    }

    /// Create the control table if this is the first run against the destination.
    pub async fn ensure_control_table(&mut self) -> Result<(), SyncError> {
        self.destination
            .ensure_control_table()
            .await
            .map_err(|err| SyncError::Watermark {
                table: CONTROL_TABLE.to_string(),
                source: err,
            })
    }

    pub async fn get_watermark(&mut self, table: &str) -> Result<Option<Watermark>, SyncError> {
        self.destination
            .read_watermark(table)
            .await
            .map_err(|err| SyncError::Watermark {
                table: table.to_string(),
                source: err,
            })
    }

    /// Upsert the watermark for `table`.
    pub async fn set_watermark(&mut self, table: &str, watermark: Watermark) -> Result<(), SyncError> {
        self.destination
            .write_watermark(table, watermark)
            .await
            .map_err(|err| SyncError::Watermark {
                table: table.to_string(),
                source: err,
            })?;
        tracing::debug!("Watermark for {} set to {}", table, watermark);
        Ok(())
    }
}
