// ABOUTME: Batch upsert writer - transfers row sets to the destination in bounded batches
// ABOUTME: All batches of one write commit together; failures roll back and surface the batch

use anyhow::anyhow;

use super::connection::{DestinationConnection, Row};
use super::error::SyncError;
use super::schema::TableDescriptor;

/// Rows per upsert statement unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Column layout of an upsert statement for one table.
///
/// `update_columns` are overwritten when the primary key already exists. The
/// change-timestamp column is never among them: it records when the row was
/// learned, so an existing destination row keeps its original value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertPlan {
    pub table: String,
    pub columns: Vec<String>,
    pub update_columns: Vec<String>,
}

impl UpsertPlan {
    pub fn for_table(descriptor: &TableDescriptor) -> Self {
        let update_columns = descriptor
            .columns
            .iter()
            .filter(|c| Some(c.as_str()) != descriptor.change_column.as_deref())
            .cloned()
            .collect();

        Self {
            table: descriptor.name.clone(),
            columns: descriptor.columns.clone(),
            update_columns,
        }
    }
}

/// Totals from one [`BatchUpsertWriter::write`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows: usize,
    pub batches: usize,
    /// Affected-row count reported by the destination. MySQL counts an updated
    /// row twice, so this is informational only.
    pub affected: u64,
}

/// Writes row sets with insert-or-update semantics, `batch_size` rows per statement.
pub struct BatchUpsertWriter<'a, D: ?Sized> {
    destination: &'a mut D,
    batch_size: usize,
}

impl<'a, D> BatchUpsertWriter<'a, D>
where
    D: DestinationConnection + ?Sized,
{
    pub fn new(destination: &'a mut D, batch_size: usize) -> Self {
        Self {
            destination,
            batch_size: batch_size.max(1),
        }
    }

    /// Upsert `rows` into `plan.table`.
    ///
    /// The whole call is one transaction. On failure it is rolled back and a
    /// [`SyncError::Write`] names the 1-based batch that failed; callers should
    /// still treat the destination contents as unknown and rely on the upsert
    /// being safe to repeat.
    pub async fn write(&mut self, plan: &UpsertPlan, rows: &[Row]) -> Result<WriteSummary, SyncError> {
        if rows.is_empty() {
            return Ok(WriteSummary::default());
        }

        let write_error = |batch: usize, err: anyhow::Error| SyncError::Write {
            table: plan.table.clone(),
            batch,
            source: err,
        };

        if let Some(bad) = rows.iter().position(|r| r.len() != plan.columns.len()) {
            return Err(write_error(
                bad / self.batch_size + 1,
                anyhow!(
                    "Row {} has {} values but {} has {} columns",
                    bad,
                    rows[bad].len(),
                    plan.table,
                    plan.columns.len()
                ),
            ));
        }

        let chunk_size = self
            .batch_size
            .min(self.destination.max_rows_per_statement(plan.columns.len()))
            .max(1);

        self.destination
            .begin()
            .await
            .map_err(|err| write_error(1, err))?;

        let mut summary = WriteSummary::default();
        for (index, batch) in rows.chunks(chunk_size).enumerate() {
            match self.destination.upsert_batch(plan, batch).await {
                Ok(affected) => {
                    summary.rows += batch.len();
                    summary.batches += 1;
                    summary.affected += affected;
                    tracing::debug!(
                        "Upserted batch {} into {} ({} rows, {} total)",
                        index + 1,
                        plan.table,
                        batch.len(),
                        summary.rows
                    );
                }
                Err(err) => {
                    if let Err(rollback_err) = self.destination.rollback().await {
                        tracing::warn!(
                            "Rollback after failed batch on {} also failed: {:?}",
                            plan.table,
                            rollback_err
                        );
                    }
                    return Err(write_error(index + 1, err));
                }
            }
        }

        self.destination
            .commit()
            .await
            .map_err(|err| write_error(summary.batches, err))?;

        Ok(summary)
    }
}
