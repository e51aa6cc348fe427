use std::collections::HashMap;
use std::sync::Arc;

use mqtt2db_api::{StorageBackend, TableDefinition, TableRef};

use crate::config::{Mqtt2DbConfig, Subscription};
use crate::error::EngineError;

/// A table definition together with the backend of its owning database.
pub struct RegisteredTable {
    pub definition: TableDefinition,
    pub backend: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for RegisteredTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTable")
            .field("table", &self.definition.table_ref())
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Immutable `(database, table)` -> definition map, built once at startup.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: HashMap<TableRef, RegisteredTable>,
}

impl SchemaRegistry {
    /// Build the registry from configuration and one backend per database.
    pub fn new(
        config: &Mqtt2DbConfig,
        backends: &HashMap<String, Arc<dyn StorageBackend>>,
    ) -> Result<Self, EngineError> {
        let mut tables = HashMap::new();
        for table_cfg in &config.tables {
            let backend = backends
                .get(&table_cfg.db)
                .cloned()
                .ok_or_else(|| EngineError::MissingBackend(table_cfg.db.clone()))?;
            let definition = table_cfg.definition();
            tracing::debug!(
                table = %definition.table_ref(),
                columns = definition.columns.len(),
                backend = backend.name(),
                "registered table"
            );
            tables.insert(definition.table_ref(), RegisteredTable { definition, backend });
        }
        Ok(Self { tables })
    }

    pub fn get(&self, database: &str, table: &str) -> Option<&RegisteredTable> {
        self.tables.get(&TableRef {
            database: database.to_string(),
            table: table.to_string(),
        })
    }

    /// Table resolver: the table a subscription writes into.
    ///
    /// A subscription with `db` resolves exactly. Without it, the unique table
    /// of that name is used; names shared by several databases are rejected
    /// when the configuration is validated, and resolve to nothing here.
    pub fn resolve(&self, sub: &Subscription) -> Option<&RegisteredTable> {
        match &sub.db {
            Some(db) => self.get(db, &sub.table),
            None => {
                let mut found = self.tables.values().filter(|t| t.definition.name == sub.table);
                let first = found.next()?;
                match found.next() {
                    Some(_) => None,
                    None => Some(first),
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_refs(&self) -> Vec<TableRef> {
        let mut refs: Vec<TableRef> = self.tables.keys().cloned().collect();
        refs.sort();
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    use mqtt2db_api::{IngestError, StorageTransaction};

    struct NoBackend;

    impl StorageBackend for NoBackend {
        fn begin(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn StorageTransaction>, IngestError>> + Send + '_>> {
            Box::pin(async { Err::<Box<dyn StorageTransaction>, _>(IngestError::io("not connected")) })
        }

        fn name(&self) -> &str {
            "none"
        }
    }

    const CONFIG: &str = r#"
[[databases]]
name = "weather"
host = "localhost"
username = "mqtt"
database_name = "weather"

[[databases]]
name = "archive"
host = "localhost"
username = "mqtt"
database_name = "archive"

[[tables]]
table_name = "raw_wind"
db = "weather"
columns = [{ column_name = "dt", type = "datetime" }]

[[tables]]
table_name = "raw_temp_rh"
db = "weather"
columns = [{ column_name = "dt", type = "datetime" }]

[[tables]]
table_name = "raw_temp_rh"
db = "archive"
columns = [{ column_name = "dt", type = "datetime" }]
"#;

    fn registry() -> SchemaRegistry {
        let cfg = Mqtt2DbConfig::parse(CONFIG).unwrap();
        let backend: Arc<dyn StorageBackend> = Arc::new(NoBackend);
        let backends = HashMap::from([
            ("weather".to_string(), backend.clone()),
            ("archive".to_string(), backend),
        ]);
        SchemaRegistry::new(&cfg, &backends).unwrap()
    }

    fn sub(table: &str, db: Option<&str>) -> Subscription {
        Subscription {
            topic: "t".into(),
            table: table.into(),
            column: "c".into(),
            broker: "home".into(),
            db: db.map(Into::into),
            qos: 0,
        }
    }

    #[test]
    fn unique_name_resolves_without_db() {
        let reg = registry();
        let table = reg.resolve(&sub("raw_wind", None)).unwrap();
        assert_eq!(table.definition.database, "weather");
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn shared_name_needs_db() {
        let reg = registry();
        assert!(reg.resolve(&sub("raw_temp_rh", None)).is_none());
        let table = reg.resolve(&sub("raw_temp_rh", Some("archive"))).unwrap();
        assert_eq!(table.definition.database, "archive");
        assert!(reg.resolve(&sub("raw_wind", Some("archive"))).is_none());
    }

    #[test]
    fn table_refs_are_sorted() {
        let refs: Vec<String> = registry().table_refs().iter().map(ToString::to_string).collect();
        assert_eq!(refs, vec!["archive.raw_temp_rh", "weather.raw_temp_rh", "weather.raw_wind"]);
    }
}
