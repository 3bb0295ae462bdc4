// ABOUTME: Table syncer - one sync pass for a single table
// ABOUTME: Decides full vs incremental, fetches rows, upserts them, then advances the watermark

use std::fmt;

use super::connection::{DestinationConnection, SourceConnection};
use super::error::SyncError;
use super::schema::TableDescriptor;
use super::state::SyncStateStore;
use super::watermark::{max_watermark, Watermark};
use super::writer::{BatchUpsertWriter, UpsertPlan};

/// How a sync pass selects rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// No stored watermark: transfer every row.
    Full,
    /// Transfer rows whose change-timestamp is strictly greater than `since`.
    Incremental { since: Watermark },
}

impl SyncMode {
    pub fn since(&self) -> Option<Watermark> {
        match self {
            SyncMode::Full => None,
            SyncMode::Incremental { since } => Some(*since),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => write!(f, "full"),
            SyncMode::Incremental { .. } => write!(f, "incremental"),
        }
    }
}

/// Result of a successful sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSyncSummary {
    pub table: String,
    pub mode: SyncMode,
    pub rows_fetched: usize,
    pub batches: usize,
    /// Watermark persisted by this pass, if it advanced.
    pub new_watermark: Option<Watermark>,
}

/// Runs one sync pass for a table over its own pair of connections.
///
/// The syncer owns both connections for its lifetime; they are released when
/// [`TableSyncer::run`] returns, whether it succeeds or fails.
pub struct TableSyncer<S, D> {
    source: S,
    destination: D,
    descriptor: TableDescriptor,
    batch_size: usize,
}

impl<S, D> TableSyncer<S, D>
where
    S: SourceConnection,
    D: DestinationConnection,
{
    pub fn new(source: S, destination: D, descriptor: TableDescriptor, batch_size: usize) -> Self {
        Self {
            source,
            destination,
            descriptor,
            batch_size,
        }
    }

    pub async fn run(mut self) -> Result<TableSyncSummary, SyncError> {
        let table = self.descriptor.name.clone();

        let mode = self.decide_mode().await?;
        match mode {
            SyncMode::Full => tracing::info!("Performing full sync for table: {}", table),
            SyncMode::Incremental { since } => tracing::info!(
                "Performing incremental sync for table: {} (since {})",
                table,
                since
            ),
        }

        let rows = self
            .source
            .fetch_rows(&self.descriptor, mode.since())
            .await
            .map_err(|err| SyncError::Fetch {
                table: table.clone(),
                source: err,
            })?;

        // Taken from the fetched set so the watermark never covers rows that
        // arrived after the fetch.
        let fetched_max = match self.descriptor.change_column_index() {
            Some(index) => max_watermark(&rows, index).map_err(|err| SyncError::Fetch {
                table: table.clone(),
                source: err,
            })?,
            None => None,
        };

        let plan = UpsertPlan::for_table(&self.descriptor);
        let written = BatchUpsertWriter::new(&mut self.destination, self.batch_size)
            .write(&plan, &rows)
            .await?;

        let new_watermark = match fetched_max {
            Some(max) if mode.since().map_or(true, |since| max > since) => {
                SyncStateStore::new(&mut self.destination)
                    .set_watermark(&table, max)
                    .await?;
                Some(max)
            }
            _ => None,
        };

        match (mode, new_watermark) {
            (_, Some(watermark)) => tracing::info!(
                "{} sync completed for table: {} ({} rows in {} batches, watermark {})",
                mode_label(mode),
                table,
                written.rows,
                written.batches,
                watermark
            ),
            (SyncMode::Incremental { .. }, None) if rows.is_empty() => {
                tracing::info!("Incremental sync completed for table: {} (no new rows)", table)
            }
            (_, None) => tracing::info!(
                "{} sync completed for table: {} ({} rows in {} batches, watermark unchanged)",
                mode_label(mode),
                table,
                written.rows,
                written.batches
            ),
        }

        Ok(TableSyncSummary {
            table,
            mode,
            rows_fetched: rows.len(),
            batches: written.batches,
            new_watermark,
        })
    }

    async fn decide_mode(&mut self) -> Result<SyncMode, SyncError> {
        if !self.descriptor.supports_incremental() {
            return Ok(SyncMode::Full);
        }

        let stored = SyncStateStore::new(&mut self.destination)
            .get_watermark(&self.descriptor.name)
            .await?;

        Ok(match stored {
            Some(since) => SyncMode::Incremental { since },
            None => SyncMode::Full,
        })
    }
}

fn mode_label(mode: SyncMode) -> &'static str {
    match mode {
        SyncMode::Full => "Full",
        SyncMode::Incremental { .. } => "Incremental",
    }
}
