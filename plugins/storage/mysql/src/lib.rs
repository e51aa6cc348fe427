use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::query::Query;
use sqlx::{Row, Transaction};

use mqtt2db_api::{
    ColumnValue, IngestError, RowId, RowValues, StorageBackend, StorageTransaction, TableDefinition,
};
use mqtt2db_engine::DatabaseConfig;

/// Quote an identifier for MySQL. Identifiers are validated at config load;
/// backticks are doubled regardless.
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub fn select_sql(table: &TableDefinition) -> String {
    format!(
        "SELECT CAST({} AS SIGNED) FROM {} WHERE {} = ? ORDER BY {} LIMIT 1",
        quote_ident(&table.id_column),
        quote_ident(&table.name),
        quote_ident(&table.bucket_column),
        quote_ident(&table.id_column),
    )
}

pub fn insert_sql(table: &TableDefinition, values: &RowValues) -> String {
    let columns: Vec<String> = values.iter().map(|(c, _)| quote_ident(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&table.name),
        columns.join(", "),
        placeholders,
    )
}

pub fn update_sql(table: &TableDefinition, values: &RowValues) -> String {
    let assignments: Vec<String> = values
        .iter()
        .map(|(c, _)| format!("{} = ?", quote_ident(c)))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?",
        quote_ident(&table.name),
        assignments.join(", "),
        quote_ident(&table.id_column),
    )
}

fn bind_value<'q>(query: Query<'q, MySql, MySqlArguments>, value: &ColumnValue) -> Query<'q, MySql, MySqlArguments> {
    match value {
        ColumnValue::Text(s) => query.bind(s.clone()),
        ColumnValue::Bytes(b) => query.bind(b.clone()),
        ColumnValue::Timestamp(ts) => query.bind(ts.naive_utc()),
    }
}

/// Connectivity problems are `Io`; anything the server rejects is `Storage`.
fn map_err(e: sqlx::Error) -> IngestError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => IngestError::io(e.to_string()),
        other => IngestError::storage(other.to_string()),
    }
}

// ═══════════════════════════════════════════════════════════════
//  MySqlStorage
// ═══════════════════════════════════════════════════════════════

/// MySQL storage backend. Tables are expected to exist; nothing is created.
pub struct MySqlStorage {
    pool: MySqlPool,
}

impl MySqlStorage {
    /// Connect using the components of a `databases[]` entry.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, IngestError> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database_name);
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| map_err(e).with_context(config.display_url()))?;
        tracing::info!(db = %config.name(), url = %config.display_url(), "connected to mysql");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl StorageBackend for MySqlStorage {
    fn begin(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn StorageTransaction>, IngestError>> + Send + '_>> {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(map_err)?;
            Ok(Box::new(MySqlTransaction { tx }) as Box<dyn StorageTransaction>)
        })
    }

    fn name(&self) -> &str {
        "mysql"
    }
}

// ═══════════════════════════════════════════════════════════════
//  MySqlTransaction
// ═══════════════════════════════════════════════════════════════

/// Dropping it without `commit` rolls back.
struct MySqlTransaction {
    tx: Transaction<'static, MySql>,
}

impl StorageTransaction for MySqlTransaction {
    fn find_row<'a>(
        &'a mut self,
        table: &'a TableDefinition,
        bucket: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RowId>, IngestError>> + Send + 'a>> {
        Box::pin(async move {
            let sql = select_sql(table);
            let row = sqlx::query(&sql)
                .bind(bucket.naive_utc())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_err)?;
            match row {
                Some(row) => {
                    let id: i64 = row.try_get(0).map_err(map_err)?;
                    Ok(Some(RowId(id)))
                }
                None => Ok(None),
            }
        })
    }

    fn insert_row<'a>(
        &'a mut self,
        table: &'a TableDefinition,
        values: &'a RowValues,
    ) -> Pin<Box<dyn Future<Output = Result<RowId, IngestError>> + Send + 'a>> {
        Box::pin(async move {
            let sql = insert_sql(table, values);
            let mut query = sqlx::query(&sql);
            for (_, value) in values.iter() {
                query = bind_value(query, value);
            }
            let result = query.execute(&mut *self.tx).await.map_err(map_err)?;
            Ok(RowId(result.last_insert_id() as i64))
        })
    }

    fn update_row<'a>(
        &'a mut self,
        table: &'a TableDefinition,
        row: RowId,
        values: &'a RowValues,
    ) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + 'a>> {
        Box::pin(async move {
            if values.is_empty() {
                return Ok(());
            }
            let sql = update_sql(table, values);
            let mut query = sqlx::query(&sql);
            for (_, value) in values.iter() {
                query = bind_value(query, value);
            }
            query
                .bind(row.0)
                .execute(&mut *self.tx)
                .await
                .map_err(map_err)?;
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send>> {
        let tx = self.tx;
        Box::pin(async move { tx.commit().await.map_err(map_err) })
    }
}
