//! Document store interface.
//!
//! Records live in named collections as schemaless JSON documents. The rest of
//! the crate only talks to [`RecordStore`]; positions inside an ordered result
//! are carried around as opaque [`Cursor`]s.

pub mod cursor;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::time::Duration;
use thiserror::Error;

pub use cursor::Cursor;
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Notices,
    Schedules,
    Resources,
    Consultations,
    Analytics,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Notices => "notices",
            Collection::Schedules => "schedules",
            Collection::Resources => "resources",
            Collection::Consultations => "consultations",
            Collection::Analytics => "analytics",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: Collection, id: String },

    #[error("invalid cursor")]
    InvalidCursor,

    #[error("failed to decode document: {0}")]
    Decode(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Server timestamps are stored as fixed-width RFC 3339 UTC strings so that
/// lexical and chronological order agree.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn timestamp_value(at: &DateTime<Utc>) -> Value {
    Value::String(format_timestamp(at))
}

/// A stored document: its id plus the field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Decode into a typed record; the document id is exposed as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(fields)).map_err(|e| {
            StoreError::Decode(format!("{}: {}", self.id, e))
        })
    }
}

/// Field values for a create or update. Fields named with
/// [`Write::server_timestamp`] are filled in by the store at write time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Write {
    fields: Map<String, Value>,
    server_timestamps: Vec<&'static str>,
}

impl Write {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn server_timestamp(mut self, field: &'static str) -> Self {
        self.server_timestamps.push(field);
        self
    }

    /// The final field map with every server timestamp set to `now`.
    pub fn resolve(self, now: DateTime<Utc>) -> Map<String, Value> {
        let mut fields = self.fields;
        for field in self.server_timestamps {
            fields.insert(field.to_string(), timestamp_value(&now));
        }
        fields
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lt,
}

impl FilterOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
        }
    }

    fn matches(&self, ordering: Ordering) -> bool {
        match self {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Gte => ordering != Ordering::Less,
            FilterOp::Lt => ordering == Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::Gte,
            value: value.into(),
        }
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::Lt,
            value: value.into(),
        }
    }

    /// Documents missing the field never match.
    pub fn matches(&self, doc: &Document) -> bool {
        doc.field(&self.field)
            .map(|v| self.op.matches(compare_values(v, &self.value)))
            .unwrap_or(false)
    }
}

/// Ordered query against one collection. Documents lacking the order field
/// are not returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub order_by: String,
    pub direction: Direction,
    pub limit: Option<usize>,
    pub start_after: Option<Cursor>,
    pub filters: Vec<Filter>,
}

impl Query {
    pub fn ordered(order_by: &str, direction: Direction) -> Self {
        Self {
            order_by: order_by.to_string(),
            direction,
            limit: None,
            start_after: None,
            filters: Vec::new(),
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, cursor: Option<Cursor>) -> Self {
        self.start_after = cursor;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

/// Total order over JSON scalars: numbers numerically, strings lexically,
/// values of different kinds by kind.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend name for health output.
    fn backend(&self) -> &'static str;

    async fn create(&self, collection: Collection, write: Write) -> Result<String, StoreError>;

    /// Merges the given fields into an existing document.
    async fn update(&self, collection: Collection, id: &str, write: Write)
        -> Result<(), StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError>;

    async fn query(&self, collection: Collection, query: &Query)
        -> Result<Vec<Document>, StoreError>;

    async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<Duration, StoreError>;
}
