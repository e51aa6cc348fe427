pub mod bucket;
pub mod error;
pub mod message;
pub mod schema;
pub mod storage;

use serde::{Deserialize, Serialize};

pub use bucket::BucketPolicy;
pub use error::{ErrorKind, IngestError};
pub use message::{ColumnValue, InboundMessage, RowValues};
pub use schema::{ColumnDef, ColumnType, TableDefinition, TableRef, is_valid_identifier};
pub use storage::{RowId, StorageBackend, StorageTransaction};

// ════════════════════════════════════════════════════════════════
//  Overflow Policy
// ════════════════════════════════════════════════════════════════

/// What a broker session does when the dispatch channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// try_send(): drop the message and log it.
    Drop,
    /// .send().await: wait for room, stalling the broker event loop.
    #[default]
    #[serde(alias = "backpressure")]
    BackPressure,
}
