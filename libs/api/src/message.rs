use chrono::{DateTime, Utc};

/// One publish received from a broker. Lives only for the duration of a
/// single dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Name of the broker the message arrived on (`brokers[].brokername`).
    pub broker: String,
    pub topic: String,
    /// Raw payload bytes, passed through to storage without parsing.
    pub payload: Vec<u8>,
    /// Receipt instant, stamped when the broker session reads the publish.
    /// The bucket key is derived from it, never from the payload.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(broker: impl Into<String>, topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            broker: broker.into(),
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }
}

/// Value written into a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    /// Payload that is valid UTF-8. The storage layer coerces it to the column type.
    Text(String),
    /// Payload that is not valid UTF-8.
    Bytes(Vec<u8>),
    /// Bucket key.
    Timestamp(DateTime<Utc>),
}

impl ColumnValue {
    /// Wrap a raw payload. No numeric parsing or unit conversion happens here.
    pub fn from_payload(payload: &[u8]) -> Self {
        match std::str::from_utf8(payload) {
            Ok(s) => ColumnValue::Text(s.to_string()),
            Err(_) => ColumnValue::Bytes(payload.to_vec()),
        }
    }
}

impl std::fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnValue::Text(s) => f.write_str(s),
            ColumnValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            ColumnValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.6f")),
        }
    }
}

/// Ordered set of `(column, value)` pairs for an insert or update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowValues {
    values: Vec<(String, ColumnValue)>,
}

impl RowValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column. A later value for the same column replaces the earlier one.
    pub fn with(mut self, column: impl Into<String>, value: ColumnValue) -> Self {
        let column = column.into();
        match self.values.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column, value)),
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.values.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
        self.values.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
