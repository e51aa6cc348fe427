use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::error::IngestError;
use crate::message::RowValues;
use crate::schema::TableDefinition;

/// Primary key of a stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub i64);

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Storage backend for one database. Each database in the configuration
/// has its own instance; tables reference it through the schema registry.
///
/// Backends: MySQL, in-memory.
pub trait StorageBackend: Send + Sync {
    /// Open a transaction. One transaction covers exactly one reconciled write.
    fn begin(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn StorageTransaction>, IngestError>> + Send + '_>>;

    /// Backend name for logging (e.g. "mysql", "memory").
    fn name(&self) -> &str;
}

/// Open transaction against a storage backend.
///
/// Dropping a transaction without calling `commit` discards its writes.
pub trait StorageTransaction: Send {
    /// Row in `table` whose bucket column equals `bucket`, if any.
    fn find_row<'a>(
        &'a mut self,
        table: &'a TableDefinition,
        bucket: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RowId>, IngestError>> + Send + 'a>>;

    /// Insert a new row. Columns missing from `values` stay NULL.
    fn insert_row<'a>(
        &'a mut self,
        table: &'a TableDefinition,
        values: &'a RowValues,
    ) -> Pin<Box<dyn Future<Output = Result<RowId, IngestError>> + Send + 'a>>;

    /// Update only the columns present in `values`, leaving others untouched.
    fn update_row<'a>(
        &'a mut self,
        table: &'a TableDefinition,
        row: RowId,
        values: &'a RowValues,
    ) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + 'a>>;

    /// Commit everything written through this transaction.
    fn commit(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send>>;
}
