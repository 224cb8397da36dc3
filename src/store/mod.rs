//! Document store capability
//!
//! The store handle is injected at construction time. Two adapters exist:
//! - `memory.rs`: in-process documents with live listeners
//! - `firestore.rs`: Firestore REST v1
//!
//! Both speak plain JSON objects; typed documents go through serde.

mod firestore;
mod memory;

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{DashboardError, Result};
use crate::listener::Subscription;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

/// Document body: a JSON object
pub type Fields = Map<String, Value>;

/// Receives the full ordered result set of a live query
pub type SnapshotListener = dyn Fn(&[Document]);

fn validate_segments(raw: &str) -> Result<Vec<String>> {
    let segments: Vec<String> = raw.trim_matches('/').split('/').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(DashboardError::Validation(format!("invalid path: {raw:?}")));
    }
    Ok(segments)
}

/// Path to a collection (odd number of segments)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(Vec<String>);

impl CollectionPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let segments = validate_segments(raw)?;
        if segments.len() % 2 == 0 {
            return Err(DashboardError::Validation(format!("not a collection path: {raw:?}")));
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Collection id (last segment)
    pub fn id(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// Document that owns this collection, `None` at the root
    pub fn parent(&self) -> Option<DocumentPath> {
        (self.0.len() > 1).then(|| DocumentPath(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn doc(&self, id: &str) -> Result<DocumentPath> {
        if id.is_empty() || id.contains('/') {
            return Err(DashboardError::Validation(format!("invalid document id: {id:?}")));
        }
        let mut segments = self.0.clone();
        segments.push(id.to_string());
        Ok(DocumentPath(segments))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Path to a document (even number of segments)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath(Vec<String>);

impl DocumentPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let segments = validate_segments(raw)?;
        if segments.len() % 2 != 0 {
            return Err(DashboardError::Validation(format!("not a document path: {raw:?}")));
        }
        Ok(Self(segments))
    }

    pub fn id(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn parent(&self) -> CollectionPath {
        CollectionPath(self.0[..self.0.len() - 1].to_vec())
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// A stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocumentPath,
    pub fields: Fields,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Deserialize into a typed record; the document id is exposed as `id`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut fields = self.fields.clone();
        fields
            .entry("id")
            .or_insert_with(|| Value::String(self.id().to_string()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// Decode every document that fits `T`; malformed ones are logged and
/// skipped
pub fn decode_all<T: DeserializeOwned>(docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.decode() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(path = %doc.path, error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}

/// Serialize a typed record into document fields, dropping any `id` field
pub fn to_fields<T: serde::Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(mut fields) => {
            fields.remove("id");
            Ok(fields)
        }
        other => Err(DashboardError::Validation(format!(
            "document body must be an object, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordered query over a single collection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            order_by: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Apply ordering and limit; the sort is stable so equal keys keep
    /// their incoming order
    pub fn apply(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if let Some((field, direction)) = &self.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_values(a.fields.get(field), b.fields.get(field));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Ordering for query results: missing/null first, numbers numerically,
/// strings lexicographically
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&y.as_f64().unwrap_or(0.0))
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Store handle bound to the remote document database
#[async_trait(?Send)]
pub trait DocumentStore {
    /// Adapter name for diagnostics
    fn name(&self) -> &'static str;

    /// Create a document with a generated id
    async fn add_document(&self, collection: &CollectionPath, fields: Fields) -> Result<DocumentPath>;

    /// Write a document; with `merge` only the given top-level fields change
    async fn set_document(&self, path: &DocumentPath, fields: Fields, merge: bool) -> Result<()>;

    /// Change fields of an existing document; `NotFound` if it is absent
    async fn update_document(&self, path: &DocumentPath, fields: Fields) -> Result<()>;

    async fn delete_document(&self, path: &DocumentPath) -> Result<()>;

    /// One-shot read
    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Document>>;

    /// One-shot ordered query
    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Live ordered query. The listener gets the current snapshot right away
    /// and again after every write through this handle that touches the
    /// queried collection.
    async fn subscribe(&self, query: Query, listener: Rc<SnapshotListener>) -> Result<Subscription>;
}

/// Live query registration shared by the adapters
pub(crate) struct QueryListener {
    pub query: Query,
    pub listener: Rc<SnapshotListener>,
}
