//! # Document Store
//!
//! Collection/document persistence used by the session service and the
//! diagnostics sink. Documents are JSON objects addressed by
//! `(collection, id)`.
//!
//! [`DocumentStore::transact`] is the only read-modify-write primitive:
//! the mutation runs while the backend holds the document, so two
//! concurrent transactions on one document never interleave.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;

/// Collection holding chat sessions.
pub const SESSIONS: &str = "chat_sessions";
/// Collection holding diagnostic events.
pub const DIAGNOSTICS: &str = "diagnostics_log";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Read-modify-write step run inside [`DocumentStore::transact`].
///
/// Receives the current document (if any) and returns the document to write.
pub type Mutation = Box<dyn FnOnce(Option<&Value>) -> Result<Value, StoreError> + Send>;

/// Box a closure as a [`Mutation`].
pub fn mutation<F>(f: F) -> Mutation
where
    F: FnOnce(Option<&Value>) -> Result<Value, StoreError> + Send + 'static,
{
    Box::new(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filters plus optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `doc` passes every equality filter.
    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|(field, expected)| doc.get(field) == Some(expected))
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Create or overwrite a document.
    async fn set(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError>;

    /// Merge top-level fields into an existing document.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError>;

    /// Insert under a generated id and return it.
    async fn add(&self, collection: &str, doc: Value) -> Result<String, StoreError>;

    /// Documents matching `query`, as `(id, document)` pairs.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Value)>, StoreError>;

    /// Atomically apply `mutation` to one document and return what was written.
    async fn transact(&self, collection: &str, id: &str, mutation: Mutation) -> Result<Value, StoreError>;
}

/// Merge the top-level fields of `patch` into `doc`.
pub(crate) fn merge_fields(doc: &mut Value, patch: Value) -> Result<(), StoreError> {
    let (Some(target), Value::Object(fields)) = (doc.as_object_mut(), patch) else {
        return Err(StoreError::InvalidDocument("update requires object documents".into()));
    };
    for (k, v) in fields {
        target.insert(k, v);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_matches_all_filters() {
        let q = Query::new().where_eq("user_id", "u1").where_eq("type", "hold");
        assert!(q.matches(&json!({"user_id": "u1", "type": "hold", "x": 1})));
        assert!(!q.matches(&json!({"user_id": "u1", "type": "error"})));
        assert!(!q.matches(&json!({"type": "hold"})));
    }

    #[test]
    fn test_merge_fields() {
        let mut doc = json!({"a": 1, "b": 2});
        merge_fields(&mut doc, json!({"b": 3, "c": 4})).unwrap();
        assert_eq!(doc, json!({"a": 1, "b": 3, "c": 4}));
        assert!(merge_fields(&mut doc, json!([1])).is_err());
    }
}
