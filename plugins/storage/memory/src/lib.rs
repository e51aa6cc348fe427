use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use mqtt2db_api::{
    ColumnValue, IngestError, RowId, RowValues, StorageBackend, StorageTransaction,
    TableDefinition, TableRef,
};

// ═══════════════════════════════════════════════════════════════
//  State
// ═══════════════════════════════════════════════════════════════

/// A committed row. `values` holds every non-NULL column except the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRow {
    pub id: RowId,
    pub bucket: DateTime<Utc>,
    pub values: BTreeMap<String, ColumnValue>,
}

impl MemoryRow {
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.values.get(column)
    }
}

#[derive(Debug)]
struct State {
    tables: HashMap<TableRef, Vec<MemoryRow>>,
    next_id: i64,
    commits: u64,
    available: bool,
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStorage
// ═══════════════════════════════════════════════════════════════

/// In-memory storage backend.
///
/// Writes are staged per transaction and applied on commit; a transaction
/// sees committed rows plus its own staged inserts, never another open
/// transaction's. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                tables: HashMap::new(),
                next_id: 1,
                commits: 0,
                available: true,
            })),
        }
    }

    /// Committed rows of a table, ordered by id.
    pub async fn rows(&self, table: &TableRef) -> Vec<MemoryRow> {
        let state = self.state.lock().await;
        state.tables.get(table).cloned().unwrap_or_default()
    }

    /// Number of successful commits.
    pub async fn commit_count(&self) -> u64 {
        self.state.lock().await.commits
    }

    /// Simulate losing (or regaining) the database: while unavailable,
    /// `begin` and `commit` fail with an I/O error.
    pub async fn set_available(&self, available: bool) {
        self.state.lock().await.available = available;
    }
}

impl StorageBackend for MemoryStorage {
    fn begin(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn StorageTransaction>, IngestError>> + Send + '_>> {
        Box::pin(async move {
            if !self.state.lock().await.available {
                return Err(IngestError::io("memory storage unavailable"));
            }
            Ok(Box::new(MemoryTransaction {
                state: self.state.clone(),
                staged: Vec::new(),
            }) as Box<dyn StorageTransaction>)
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryTransaction
// ═══════════════════════════════════════════════════════════════

#[derive(Debug)]
enum Staged {
    Insert { table: TableRef, row: MemoryRow },
    Update { table: TableRef, row: RowId, values: RowValues },
}

struct MemoryTransaction {
    state: Arc<Mutex<State>>,
    staged: Vec<Staged>,
}

/// Reject columns the table does not declare, like a real database would.
fn check_columns(table: &TableDefinition, values: &RowValues) -> Result<(), IngestError> {
    for (column, _) in values.iter() {
        if table.column(column).is_none() {
            return Err(IngestError::storage(format!(
                "unknown column '{column}' in table '{}'",
                table.name
            )));
        }
    }
    Ok(())
}

impl StorageTransaction for MemoryTransaction {
    fn find_row<'a>(
        &'a mut self,
        table: &'a TableDefinition,
        bucket: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RowId>, IngestError>> + Send + 'a>> {
        Box::pin(async move {
            let table_ref = table.table_ref();
            let state = self.state.lock().await;
            let committed = state
                .tables
                .get(&table_ref)
                .and_then(|rows| rows.iter().find(|r| r.bucket == bucket))
                .map(|r| r.id);
            let staged = self.staged.iter().find_map(|s| match s {
                Staged::Insert { table, row } if *table == table_ref && row.bucket == bucket => Some(row.id),
                _ => None,
            });
            Ok(committed.or(staged))
        })
    }

    fn insert_row<'a>(
        &'a mut self,
        table: &'a TableDefinition,
        values: &'a RowValues,
    ) -> Pin<Box<dyn Future<Output = Result<RowId, IngestError>> + Send + 'a>> {
        Box::pin(async move {
            check_columns(table, values)?;
            let bucket = match values.get(&table.bucket_column) {
                Some(ColumnValue::Timestamp(ts)) => *ts,
                _ => {
                    return Err(IngestError::storage(format!(
                        "column '{}' requires a timestamp",
                        table.bucket_column
                    )));
                }
            };
            let id = {
                let mut state = self.state.lock().await;
                let id = RowId(state.next_id);
                state.next_id += 1;
                id
            };
            let values = values
                .iter()
                .filter(|(c, _)| *c != table.bucket_column)
                .map(|(c, v)| (c.to_string(), v.clone()))
                .collect();
            self.staged.push(Staged::Insert {
                table: table.table_ref(),
                row: MemoryRow { id, bucket, values },
            });
            Ok(id)
        })
    }

    fn update_row<'a>(
        &'a mut self,
        table: &'a TableDefinition,
        row: RowId,
        values: &'a RowValues,
    ) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + 'a>> {
        Box::pin(async move {
            check_columns(table, values)?;
            self.staged.push(Staged::Update {
                table: table.table_ref(),
                row,
                values: values.clone(),
            });
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send>> {
        let MemoryTransaction { state, staged } = *self;
        Box::pin(async move {
            let mut state = state.lock().await;
            if !state.available {
                return Err(IngestError::io("memory storage unavailable"));
            }
            // Nothing is applied unless every update has a target.
            for (i, pending) in staged.iter().enumerate() {
                let Staged::Update { table, row, .. } = pending else {
                    continue;
                };
                let committed = state
                    .tables
                    .get(table)
                    .is_some_and(|rows| rows.iter().any(|r| r.id == *row));
                let inserted = staged[..i].iter().any(|s| {
                    matches!(s, Staged::Insert { table: t, row: r } if t == table && r.id == *row)
                });
                if !committed && !inserted {
                    return Err(IngestError::storage(format!("row {row} not found in '{table}'")));
                }
            }
            for staged in staged {
                match staged {
                    Staged::Insert { table, row } => {
                        state.tables.entry(table).or_default().push(row);
                    }
                    Staged::Update { table, row, values } => {
                        if let Some(stored) = state
                            .tables
                            .get_mut(&table)
                            .and_then(|rows| rows.iter_mut().find(|r| r.id == row))
                        {
                            for (column, value) in values.iter() {
                                stored.values.insert(column.to_string(), value.clone());
                            }
                        }
                    }
                }
            }
            state.commits += 1;
            tracing::trace!(commits = state.commits, "memory storage commit");
            Ok(())
        })
    }
}
