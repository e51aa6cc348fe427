use serde::{Deserialize, Serialize};

/// Declared type of a table column.
///
/// The engine does not coerce payloads into these types. They describe the
/// physical table and are used to validate the bucket column at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[serde(alias = "int")]
    Integer,
    Bigint,
    #[serde(alias = "double", alias = "real")]
    Float,
    Decimal,
    Boolean,
    #[serde(alias = "varchar")]
    String,
    Text,
    Datetime,
    Date,
    Time,
    Blob,
    Json,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Bigint => "bigint",
            ColumnType::Float => "float",
            ColumnType::Decimal => "decimal",
            ColumnType::Boolean => "boolean",
            ColumnType::String => "string",
            ColumnType::Text => "text",
            ColumnType::Datetime => "datetime",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::Blob => "blob",
            ColumnType::Json => "json",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    #[serde(rename = "column_name")]
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self { name: name.into(), column_type }
    }
}

/// Physical table a subscription writes into. Built once at startup and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    /// Name of the owning database (`databases[].name`).
    pub database: String,
    /// Column holding the bucket key (`dt`).
    pub bucket_column: String,
    /// Auto-increment primary key used to address an existing row.
    pub id_column: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef {
            database: self.database.clone(),
            table: self.name.clone(),
        }
    }
}

/// Fully qualified `(database, table)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// SQL identifier check: `[A-Za-z_][A-Za-z0-9_]*`.
///
/// Table and column names are interpolated into statements, so anything
/// else is rejected when the configuration is loaded.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
