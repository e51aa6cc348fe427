//! Message-to-row reconciliation.
//!
//! Every inbound message walks `Received -> Resolved -> {Inserted | Merged | Dropped} -> Committed`:
//! the topic resolver and the table resolver pick the target, the storage
//! backend is asked for a row at the bucket key, and either a new row is
//! inserted or the target column of the existing row is updated. Each write
//! is committed in its own transaction on the table's owning database.
//!
//! The existence check is a plain read before the write, not a unique
//! constraint. Two writers that both see "no row" for the same bucket
//! each insert one, leaving two rows for one reading.

use chrono::{DateTime, Utc};

use mqtt2db_api::{
    BucketPolicy, ColumnValue, InboundMessage, IngestError, RowId, RowValues, StorageTransaction,
    TableDefinition, TableRef,
};

use crate::config::{Mqtt2DbConfig, Subscription};
use crate::registry::{RegisteredTable, SchemaRegistry};
use crate::resolver::TopicResolver;

/// Insert-or-merge decision for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Insert,
    Merge(RowId),
}

/// Why a subscription was skipped without a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The subscription names a table the schema registry does not know.
    UnknownTable { table: String, db: Option<String> },
    /// The table exists but has no such column.
    UnknownColumn { table: TableRef, column: String },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::UnknownTable { table, db: Some(db) } => write!(f, "unknown table '{db}.{table}'"),
            DropReason::UnknownTable { table, db: None } => write!(f, "unknown table '{table}'"),
            DropReason::UnknownColumn { table, column } => write!(f, "table '{table}' has no column '{column}'"),
        }
    }
}

/// Result of applying one subscription to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Inserted { table: TableRef, column: String, bucket: DateTime<Utc>, row: RowId },
    Merged { table: TableRef, column: String, bucket: DateTime<Utc>, row: RowId },
    Dropped(DropReason),
    /// The storage backend failed; nothing was committed.
    Failed { table: TableRef, error: IngestError },
}

/// The reconciliation engine. Holds immutable lookups only; persisted row
/// state lives in the storage backends and is re-read for every message.
#[derive(Debug)]
pub struct Reconciler {
    topics: TopicResolver,
    schema: SchemaRegistry,
    bucket: BucketPolicy,
}

impl Reconciler {
    pub fn new(topics: TopicResolver, schema: SchemaRegistry, bucket: BucketPolicy) -> Self {
        Self { topics, schema, bucket }
    }

    pub fn from_config(config: &Mqtt2DbConfig, schema: SchemaRegistry) -> Self {
        Self::new(TopicResolver::new(config.subscriptions.clone()), schema, config.bucket)
    }

    pub fn topics(&self) -> &TopicResolver {
        &self.topics
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn bucket_policy(&self) -> BucketPolicy {
        self.bucket
    }

    /// Reconcile one message. Returns one outcome per matching subscription;
    /// an unmatched topic returns nothing and touches no backend.
    pub async fn handle(&self, msg: &InboundMessage) -> Vec<Outcome> {
        let subs: Vec<&Subscription> = self.topics.resolve(&msg.broker, &msg.topic).collect();
        if subs.is_empty() {
            tracing::debug!(broker = %msg.broker, topic = %msg.topic, "no subscription, dropped");
            return Vec::new();
        }

        let bucket = self.bucket.bucket_for(msg.received_at);
        let value = ColumnValue::from_payload(&msg.payload);
        tracing::debug!(topic = %msg.topic, %bucket, %value, "update received");

        let mut outcomes = Vec::with_capacity(subs.len());
        for sub in subs {
            outcomes.push(self.apply(sub, bucket, &value).await);
        }
        outcomes
    }

    async fn apply(&self, sub: &Subscription, bucket: DateTime<Utc>, value: &ColumnValue) -> Outcome {
        let table = match self.resolve_target(sub) {
            Ok(table) => table,
            Err(reason) => {
                tracing::error!(topic = %sub.topic, reason = %reason, "configuration error, message dropped");
                return Outcome::Dropped(reason);
            }
        };
        let table_ref = table.definition.table_ref();

        match commit_one(table, &sub.column, bucket, value).await {
            Ok((Decision::Insert, row)) => {
                tracing::debug!(table = %table_ref, column = %sub.column, %bucket, %row, "inserted");
                Outcome::Inserted { table: table_ref, column: sub.column.clone(), bucket, row }
            }
            Ok((Decision::Merge(_), row)) => {
                tracing::debug!(table = %table_ref, column = %sub.column, %bucket, %row, "merged");
                Outcome::Merged { table: table_ref, column: sub.column.clone(), bucket, row }
            }
            Err(error) => {
                tracing::error!(
                    table = %table_ref,
                    column = %sub.column,
                    %bucket,
                    error = ?error,
                    "storage error, write skipped"
                );
                Outcome::Failed { table: table_ref, error }
            }
        }
    }

    fn resolve_target(&self, sub: &Subscription) -> Result<&RegisteredTable, DropReason> {
        let table = self.schema.resolve(sub).ok_or_else(|| DropReason::UnknownTable {
            table: sub.table.clone(),
            db: sub.db.clone(),
        })?;
        if table.definition.column(&sub.column).is_none() {
            return Err(DropReason::UnknownColumn {
                table: table.definition.table_ref(),
                column: sub.column.clone(),
            });
        }
        Ok(table)
    }
}

/// One transaction: find, insert or update, commit. On error the
/// transaction is dropped uncommitted.
async fn commit_one(
    table: &RegisteredTable,
    column: &str,
    bucket: DateTime<Utc>,
    value: &ColumnValue,
) -> Result<(Decision, RowId), IngestError> {
    let ctx = table.definition.table_ref();
    let mut tx = table.backend.begin().await.map_err(|e| e.with_context(&ctx))?;
    let decision = decide(tx.as_mut(), &table.definition, bucket)
        .await
        .map_err(|e| e.with_context(&ctx))?;
    let row = write(tx.as_mut(), &table.definition, decision, bucket, column, value)
        .await
        .map_err(|e| e.with_context(&ctx))?;
    tx.commit().await.map_err(|e| e.with_context(&ctx))?;
    Ok((decision, row))
}

/// Look for an existing row at `bucket`.
pub async fn decide(
    tx: &mut dyn StorageTransaction,
    table: &TableDefinition,
    bucket: DateTime<Utc>,
) -> Result<Decision, IngestError> {
    Ok(match tx.find_row(table, bucket).await? {
        Some(row) => Decision::Merge(row),
        None => Decision::Insert,
    })
}

/// Apply a decision: a new row holds the bucket key and the target column
/// only; a merge touches the target column only (last write wins).
pub async fn write(
    tx: &mut dyn StorageTransaction,
    table: &TableDefinition,
    decision: Decision,
    bucket: DateTime<Utc>,
    column: &str,
    value: &ColumnValue,
) -> Result<RowId, IngestError> {
    match decision {
        Decision::Insert => {
            let values = RowValues::new()
                .with(table.bucket_column.clone(), ColumnValue::Timestamp(bucket))
                .with(column, value.clone());
            tx.insert_row(table, &values).await
        }
        Decision::Merge(row) => {
            let values = RowValues::new().with(column, value.clone());
            tx.update_row(table, row, &values).await?;
            Ok(row)
        }
    }
}
