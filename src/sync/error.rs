// ABOUTME: Error kinds surfaced by the table sync pipeline
// ABOUTME: Each variant names the table and the phase that failed

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to open {side} connection: {source:#}")]
    Connect {
        side: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to list source tables: {source:#}")]
    Discovery {
        #[source]
        source: anyhow::Error,
    },

    #[error("Table {table} rejected: {source:#}")]
    InvalidIdentifier {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Schema introspection failed for {table}: {source:#}")]
    Schema {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Provisioning failed for {table}: {source:#}")]
    Provision {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Fetching rows from {table} failed: {source:#}")]
    Fetch {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    /// Batches before `batch` may already have reached the destination. Re-running the
    /// sync is safe because every write is an upsert keyed on the primary key.
    #[error("Writing batch {batch} to {table} failed: {source:#}")]
    Write {
        table: String,
        batch: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Sync-state update failed for {table}: {source:#}")]
    Watermark {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Sync of {table} did not finish within {after:?}")]
    Timeout { table: String, after: Duration },

    #[error("Sync task for {table} panicked")]
    TaskPanicked { table: String },
}

impl SyncError {
    /// Table the error belongs to, if it is scoped to one.
    pub fn table(&self) -> Option<&str> {
        match self {
            SyncError::Connect { .. } | SyncError::Discovery { .. } => None,
            SyncError::InvalidIdentifier { table, .. }
            | SyncError::Schema { table, .. }
            | SyncError::Provision { table, .. }
            | SyncError::Fetch { table, .. }
            | SyncError::Write { table, .. }
            | SyncError::Watermark { table, .. }
            | SyncError::Timeout { table, .. }
            | SyncError::TaskPanicked { table } => Some(table),
        }
    }

    /// Short kind label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Connect { .. } => "ConnectError",
            SyncError::Discovery { .. } => "SchemaError",
            SyncError::InvalidIdentifier { .. } => "InvalidIdentifier",
            SyncError::Schema { .. } => "SchemaError",
            SyncError::Provision { .. } => "ProvisionError",
            SyncError::Fetch { .. } => "FetchError",
            SyncError::Write { .. } => "WriteError",
            SyncError::Watermark { .. } => "WatermarkError",
            SyncError::Timeout { .. } => "Timeout",
            SyncError::TaskPanicked { .. } => "TaskPanicked",
        }
    }
}
