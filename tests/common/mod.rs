// ABOUTME: In-memory source and destination databases for sync tests
// ABOUTME: Mimics MySQL upsert, transaction and sync_status behavior with failure injection
#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use mysql_async::Value;
use mysql_table_replicator::sync::{
    introspect_table, provision_table, Connector, DestinationConnection, Row, SourceConnection,
    SyncError, SyncStateStore, TableDescriptor, TableSyncSummary, TableSyncer, UpsertPlan,
    Watermark,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

pub const ORDER_COLUMNS: &[&str] = &["id", "amount", "time_stamp"];

pub struct SourceTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestinationTable {
    pub columns: Vec<String>,
    /// Keyed on the first column, which acts as the primary key
    pub rows: BTreeMap<String, Row>,
}

/// Faults to inject, keyed by table name.
#[derive(Default)]
pub struct Failures {
    pub connect_source: bool,
    pub describe: HashSet<String>,
    pub fetch: HashSet<String>,
    pub ddl: HashSet<String>,
    /// Fail the Nth (1-based) upsert batch of a transaction
    pub write_batch: HashMap<String, usize>,
    pub watermark: HashSet<String>,
    pub fetch_delay: HashMap<String, Duration>,
}

#[derive(Default)]
pub struct MemoryState {
    pub source: BTreeMap<String, SourceTable>,
    pub destination: BTreeMap<String, DestinationTable>,
    /// `None` until the control table is created
    pub sync_status: Option<BTreeMap<String, Option<Watermark>>>,
    pub ddl_log: Vec<String>,
    pub committed_batches: Vec<(String, usize)>,
    pub watermark_writes: Vec<(String, Watermark)>,
    pub fetches_in_flight: usize,
    pub max_fetches_in_flight: usize,
    pub failures: Failures,
}

/// Shared in-memory databases. Every connection opened through it sees the same state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    statement_row_limit: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statement_row_limit(mut self, limit: usize) -> Self {
        self.statement_row_limit = Some(limit);
        self
    }

    pub async fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().await
    }

    pub async fn add_source_table(&self, name: &str, columns: &[&str], rows: Vec<Row>) {
        self.state.lock().await.source.insert(
            name.to_string(),
            SourceTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
    }

    /// Replace the source row with the same primary key, or append it.
    pub async fn upsert_source_row(&self, table: &str, row: Row) {
        let mut state = self.state.lock().await;
        let rows = &mut state
            .source
            .get_mut(table)
            .expect("source table exists")
            .rows;
        match rows.iter().position(|r| r.first() == row.first()) {
            Some(index) => rows[index] = row,
            None => rows.push(row),
        }
    }

    pub async fn destination_rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .await
            .destination
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn destination_row(&self, table: &str, id: i64) -> Option<Row> {
        self.state
            .lock()
            .await
            .destination
            .get(table)
            .and_then(|t| t.rows.get(&row_key(&Value::Int(id))).cloned())
    }

    pub async fn watermark(&self, table: &str) -> Option<Watermark> {
        self.state
            .lock()
            .await
            .sync_status
            .as_ref()
            .and_then(|status| status.get(table).copied().flatten())
    }
}

#[async_trait]
impl Connector for MemoryBackend {
    type Source = MemorySource;
    type Destination = MemoryDestination;

    async fn connect_source(&self) -> Result<MemorySource> {
        if self.state.lock().await.failures.connect_source {
            bail!("Can't connect to MySQL server on 'source'");
        }
        Ok(MemorySource {
            state: Arc::clone(&self.state),
        })
    }

    async fn connect_destination(&self) -> Result<MemoryDestination> {
        Ok(MemoryDestination {
            state: Arc::clone(&self.state),
            staged: None,
            statement_row_limit: self.statement_row_limit,
        })
    }
}

pub struct MemorySource {
    state: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl SourceConnection for MemorySource {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        Ok(self.state.lock().await.source.keys().cloned().collect())
    }

    async fn describe_columns(&mut self, table: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        if state.failures.describe.contains(table) {
            bail!("Lost connection to MySQL server during query");
        }
        Ok(state
            .source
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn show_create_table(&mut self, table: &str) -> Result<String> {
        let state = self.state.lock().await;
        let source = state
            .source
            .get(table)
            .ok_or_else(|| anyhow!("Table '{}' doesn't exist", table))?;
        Ok(format!("CREATE TABLE {} ({})", table, source.columns.join(", ")))
    }

    async fn fetch_rows(
        &mut self,
        descriptor: &TableDescriptor,
        since: Option<Watermark>,
    ) -> Result<Vec<Row>> {
        let delay = {
            let mut state = self.state.lock().await;
            if state.failures.fetch.contains(&descriptor.name) {
                bail!("Lost connection to MySQL server while reading {}", descriptor.name);
            }
            state.fetches_in_flight += 1;
            state.max_fetches_in_flight = state.max_fetches_in_flight.max(state.fetches_in_flight);
            state.failures.fetch_delay.get(&descriptor.name).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        state.fetches_in_flight -= 1;

        let table = state
            .source
            .get(&descriptor.name)
            .ok_or_else(|| anyhow!("Table '{}' doesn't exist", descriptor.name))?;

        let since = match since {
            None => return Ok(table.rows.clone()),
            Some(since) => since,
        };
        let index = descriptor
            .change_column_index()
            .ok_or_else(|| anyhow!("Unknown column in where clause"))?;

        let mut rows = Vec::new();
        for row in &table.rows {
            // NULL > x and zero-date > x are never true in MySQL
            if let Some(ts) = Watermark::from_value(&row[index])? {
                if ts > since {
                    rows.push(row.clone());
                }
            }
        }
        Ok(rows)
    }
}

pub struct MemoryDestination {
    state: Arc<Mutex<MemoryState>>,
    staged: Option<Vec<(UpsertPlan, Vec<Row>)>>,
    statement_row_limit: Option<usize>,
}

#[async_trait]
impl DestinationConnection for MemoryDestination {
    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        Ok(self.state.lock().await.destination.contains_key(table))
    }

    async fn execute_ddl(&mut self, ddl: &str) -> Result<()> {
        let (name, columns) = parse_create_table(ddl)?;
        let mut state = self.state.lock().await;
        if state.failures.ddl.contains(&name) {
            bail!("Unknown collation: 'utf8mb4_0900_ai_ci'");
        }
        if state.destination.contains_key(&name) {
            bail!("Table '{}' already exists", name);
        }
        state.destination.insert(
            name,
            DestinationTable {
                columns,
                rows: BTreeMap::new(),
            },
        );
        state.ddl_log.push(ddl.to_string());
        Ok(())
    }

    async fn ensure_control_table(&mut self) -> Result<()> {
        self.state
            .lock()
            .await
            .sync_status
            .get_or_insert_with(BTreeMap::new);
        Ok(())
    }

    async fn read_watermark(&mut self, table: &str) -> Result<Option<Watermark>> {
        let state = self.state.lock().await;
        let status = state
            .sync_status
            .as_ref()
            .ok_or_else(|| anyhow!("Table 'sync_status' doesn't exist"))?;
        Ok(status.get(table).copied().flatten())
    }

    async fn write_watermark(&mut self, table: &str, watermark: Watermark) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.failures.watermark.contains(table) {
            bail!("Lock wait timeout exceeded");
        }
        let status = state
            .sync_status
            .as_mut()
            .ok_or_else(|| anyhow!("Table 'sync_status' doesn't exist"))?;
        let entry = status.entry(table.to_string()).or_insert(None);
        if entry.map_or(true, |current| watermark > current) {
            *entry = Some(watermark);
        }
        state
            .watermark_writes
            .push((table.to_string(), watermark));
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        if self.staged.is_some() {
            bail!("Transaction already open");
        }
        self.staged = Some(Vec::new());
        Ok(())
    }

    async fn upsert_batch(&mut self, plan: &UpsertPlan, rows: &[Row]) -> Result<u64> {
        let staged = self
            .staged
            .as_mut()
            .ok_or_else(|| anyhow!("Upsert outside a transaction"))?;

        let state = self.state.lock().await;
        if !state.destination.contains_key(&plan.table) {
            bail!("Table '{}' doesn't exist", plan.table);
        }
        let batch_number = staged.len() + 1;
        if state.failures.write_batch.get(&plan.table) == Some(&batch_number) {
            bail!("Deadlock found when trying to get lock");
        }

        staged.push((plan.clone(), rows.to_vec()));
        Ok(rows.len() as u64)
    }

    async fn commit(&mut self) -> Result<()> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| anyhow!("Commit outside a transaction"))?;

        let mut state = self.state.lock().await;
        for (plan, rows) in staged {
            let table = state
                .destination
                .get_mut(&plan.table)
                .ok_or_else(|| anyhow!("Table '{}' doesn't exist", plan.table))?;
            for row in &rows {
                apply_upsert(table, &plan, row);
            }
            state.committed_batches.push((plan.table.clone(), rows.len()));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged = None;
        Ok(())
    }

    fn max_rows_per_statement(&self, _columns: usize) -> usize {
        self.statement_row_limit.unwrap_or(usize::MAX)
    }
}

fn row_key(value: &Value) -> String {
    format!("{:?}", value)
}

fn apply_upsert(table: &mut DestinationTable, plan: &UpsertPlan, row: &Row) {
    let key = row.first().map(row_key).unwrap_or_default();
    match table.rows.get_mut(&key) {
        Some(existing) => {
            for (index, column) in plan.columns.iter().enumerate() {
                if plan.update_columns.contains(column) {
                    existing[index] = row[index].clone();
                }
            }
        }
        None => {
            table.rows.insert(key, row.clone());
        }
    }
}

/// Parse the `CREATE TABLE name (a, b, c)` form produced by [`MemorySource`].
fn parse_create_table(ddl: &str) -> Result<(String, Vec<String>)> {
    let rest = ddl
        .strip_prefix("CREATE TABLE ")
        .ok_or_else(|| anyhow!("You have an error in your SQL syntax near '{}'", ddl))?;
    let (name, columns) = rest
        .split_once('(')
        .ok_or_else(|| anyhow!("You have an error in your SQL syntax near '{}'", ddl))?;
    let columns = columns
        .trim_end()
        .trim_end_matches(')')
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    Ok((name.trim().to_string(), columns))
}

/// 2024-01-01 00:00:00 plus `seconds`, as a binary-protocol timestamp.
pub fn stamp(seconds: u32) -> Value {
    Value::Date(
        2024,
        1,
        1,
        (seconds / 3600) as u8,
        ((seconds / 60) % 60) as u8,
        (seconds % 60) as u8,
        0,
    )
}

pub fn watermark_at(seconds: u32) -> Watermark {
    Watermark::from_value(&stamp(seconds))
        .unwrap()
        .expect("stamp is never NULL")
}

/// A row of the `orders` layout: `(id, amount, time_stamp)`.
pub fn order_row(id: i64, amount: i64, seconds: Option<u32>) -> Row {
    vec![
        Value::Int(id),
        Value::Int(amount),
        seconds.map(stamp).unwrap_or(Value::NULL),
    ]
}

/// Ensure the control table, then introspect and provision `table`.
pub async fn prepare_table(backend: &MemoryBackend, table: &str) -> TableDescriptor {
    let mut source = backend.connect_source().await.unwrap();
    let mut destination = backend.connect_destination().await.unwrap();
    SyncStateStore::new(&mut destination)
        .ensure_control_table()
        .await
        .unwrap();
    let definition = introspect_table(&mut source, table, "time_stamp")
        .await
        .unwrap();
    provision_table(&mut destination, &definition).await.unwrap();
    definition.descriptor
}

/// One sync pass for `descriptor` over fresh connections.
pub async fn sync_once(
    backend: &MemoryBackend,
    descriptor: &TableDescriptor,
    batch_size: usize,
) -> Result<TableSyncSummary, SyncError> {
    let source = backend.connect_source().await.unwrap();
    let destination = backend.connect_destination().await.unwrap();
    TableSyncer::new(source, destination, descriptor.clone(), batch_size)
        .run()
        .await
}
