// ABOUTME: Sync orchestrator - discovers tables, provisions them, then syncs all concurrently
// ABOUTME: Per-table failures are isolated and reported; sibling tables keep going

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::connection::{Connector, SourceConnection};
use super::error::SyncError;
use super::filter::TableFilter;
use super::provisioner::{provision_table, ProvisionOutcome};
use super::schema::{introspect_table, TableDefinition, TableDescriptor, DEFAULT_TIMESTAMP_COLUMN};
use super::state::SyncStateStore;
use super::syncer::{TableSyncSummary, TableSyncer};
use super::task_group::TaskGroup;
use super::writer::DEFAULT_BATCH_SIZE;
use crate::utils::validate_mysql_identifier;

/// Options for a sync run. Connection parameters live in the [`Connector`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum rows per upsert statement
    pub batch_size: usize,
    /// Column holding each row's change-timestamp
    pub timestamp_column: String,
    /// Which source tables to sync
    pub filter: TableFilter,
    /// Wall-clock limit for one table's sync pass (None = unlimited)
    pub table_timeout: Option<Duration>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            filter: TableFilter::empty(),
            table_timeout: None,
        }
    }
}

/// Outcome for one table in a run.
#[derive(Debug)]
pub struct TableOutcome {
    pub table: String,
    pub result: Result<TableSyncSummary, SyncError>,
}

/// Per-table results of one sync cycle.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<TableOutcome>,
    pub tables_created: usize,
    pub duration: Duration,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn rows_synced(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| s.rows_fetched)
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &SyncError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.table.as_str(), e)))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// A run is fatal only when at least one table failed and none succeeded.
    pub fn is_fatal(&self) -> bool {
        self.failed() > 0 && self.succeeded() == 0
    }

    pub fn log_summary(&self) {
        let secs = self.duration.as_secs_f64();
        tracing::info!(
            "Sync cycle complete: {} succeeded, {} failed, {} rows, {} tables created",
            self.succeeded(),
            self.failed(),
            self.rows_synced(),
            self.tables_created
        );
        for (table, err) in self.failures() {
            tracing::warn!("  {} [{}]: {}", table, err.kind(), err);
        }
        tracing::info!("--- {:.2} Total Execution Seconds ---", secs);
        tracing::info!("--- {:.2} Total Execution Minutes ---", secs / 60.0);
    }
}

/// Runs full sync cycles: control table, discovery, sequential provisioning, then
/// one concurrent [`TableSyncer`] per table.
///
/// Provisioning failures are isolated: the table is dropped from the fan-out,
/// its cause is logged and reported, and the remaining tables continue.
pub struct SyncOrchestrator<C> {
    connector: Arc<C>,
    options: SyncOptions,
}

impl<C: Connector> SyncOrchestrator<C> {
    pub fn new(connector: C, options: SyncOptions) -> Self {
        Self {
            connector: Arc::new(connector),
            options,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run one sync cycle over every selected table.
    ///
    /// Returns `Err` only when the cycle cannot start: a provisioning connection
    /// cannot be opened, the control table cannot be created, or the source tables
    /// cannot be listed. Everything else is reported per table.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        let definitions = self.provision_all(&mut report).await?;

        let mut group = TaskGroup::new();
        for definition in definitions {
            let table = definition.descriptor.name.clone();
            group.spawn(
                table,
                sync_table(
                    Arc::clone(&self.connector),
                    definition.descriptor,
                    self.options.batch_size,
                    self.options.table_timeout,
                ),
            );
        }

        tracing::info!("Syncing {} tables concurrently", group.len());
        for (table, result) in group.join_all().await {
            let result = result.unwrap_or_else(|| {
                Err(SyncError::TaskPanicked {
                    table: table.clone(),
                })
            });
            if let Err(ref e) = result {
                tracing::error!("Failed to sync table {}: {:?}", table, e);
            }
            report.outcomes.push(TableOutcome { table, result });
        }

        report.duration = start.elapsed();
        Ok(report)
    }

    /// Sequential phase: ensure the control table, list tables, and provision each
    /// one on the destination. Returns the tables that are ready to sync.
    async fn provision_all(&self, report: &mut SyncReport) -> Result<Vec<TableDefinition>, SyncError> {
        let mut source = self
            .connector
            .connect_source()
            .await
            .map_err(|err| SyncError::Connect {
                side: "source",
                source: err,
            })?;
        let mut destination = self
            .connector
            .connect_destination()
            .await
            .map_err(|err| SyncError::Connect {
                side: "destination",
                source: err,
            })?;

        SyncStateStore::new(&mut destination)
            .ensure_control_table()
            .await?;

        let tables = source
            .list_tables()
            .await
            .map_err(|err| SyncError::Discovery { source: err })?;
        let tables = self.options.filter.apply(tables);
        tracing::info!("Found {} tables to sync", tables.len());

        let mut ready = Vec::with_capacity(tables.len());
        for table in tables {
            tracing::info!("Preparing table: {}", table);

            let prepared = match validate_mysql_identifier(&table) {
                Err(err) => Err(SyncError::InvalidIdentifier {
                    table: table.clone(),
                    source: err,
                }),
                Ok(()) => {
                    match introspect_table(&mut source, &table, &self.options.timestamp_column)
                        .await
                    {
                        Ok(definition) => provision_table(&mut destination, &definition)
                            .await
                            .map(|outcome| (definition, outcome)),
                        Err(err) => Err(err),
                    }
                }
            };

            match prepared {
                Ok((definition, outcome)) => {
                    if outcome == ProvisionOutcome::Created {
                        report.tables_created += 1;
                    }
                    ready.push(definition);
                }
                Err(err) => {
                    tracing::error!("Skipping table {}: {:?}", table, err);
                    report.outcomes.push(TableOutcome {
                        table,
                        result: Err(err),
                    });
                }
            }
        }

        Ok(ready)
    }
}

/// Sync one table over a freshly opened connection pair.
async fn sync_table<C: Connector>(
    connector: Arc<C>,
    descriptor: TableDescriptor,
    batch_size: usize,
    table_timeout: Option<Duration>,
) -> Result<TableSyncSummary, SyncError> {
    let table = descriptor.name.clone();

    let pass = async move {
        let source = connector
            .connect_source()
            .await
            .map_err(|err| SyncError::Connect {
                side: "source",
                source: err,
            })?;
        let destination = connector
            .connect_destination()
            .await
            .map_err(|err| SyncError::Connect {
                side: "destination",
                source: err,
            })?;

        TableSyncer::new(source, destination, descriptor, batch_size)
            .run()
            .await
    };

    match table_timeout {
        Some(limit) => tokio::time::timeout(limit, pass)
            .await
            .unwrap_or_else(|_| Err(SyncError::Timeout { table, after: limit })),
        None => pass.await,
    }
}
