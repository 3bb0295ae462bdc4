// ABOUTME: Timestamp-watermarked table sync between two SQL databases
// ABOUTME: Full sync on first run, incremental upserts keyed on a change-timestamp afterwards

pub mod connection;
pub mod daemon;
pub mod error;
pub mod filter;
pub mod orchestrator;
pub mod provisioner;
pub mod schema;
pub mod state;
pub mod syncer;
pub mod task_group;
pub mod watermark;
pub mod writer;

pub use connection::{Connector, DestinationConnection, Row, SourceConnection};
pub use daemon::SyncDaemon;
pub use error::SyncError;
pub use filter::TableFilter;
pub use orchestrator::{SyncOptions, SyncOrchestrator, SyncReport, TableOutcome};
pub use provisioner::{provision_table, ProvisionOutcome};
pub use schema::{introspect_table, TableDefinition, TableDescriptor, DEFAULT_TIMESTAMP_COLUMN};
pub use state::{SyncStateStore, SyncStatusRecord, CONTROL_TABLE};
pub use syncer::{SyncMode, TableSyncSummary, TableSyncer};
pub use task_group::TaskGroup;
pub use watermark::Watermark;
pub use writer::{BatchUpsertWriter, UpsertPlan, WriteSummary, DEFAULT_BATCH_SIZE};
