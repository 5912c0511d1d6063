//! In-process [`DocumentStore`] over `DashMap`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{merge_fields, Direction, DocumentStore, Mutation, Query, StoreError};

#[derive(Debug, Clone)]
struct Stored {
    /// Insertion sequence; breaks ordering ties.
    seq: u64,
    doc: Value,
}

/// Volatile store. Each collection is one map entry, so a transaction holds
/// that collection's shard lock for the duration of the mutation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, HashMap<String, Stored>>,
    seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, AtomicOrdering::SeqCst)
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(id).map(|s| s.doc.clone())))
    }

    async fn set(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        let seq = self.next_seq();
        let mut coll = self.collections.entry(collection.to_string()).or_default();
        let seq = coll.get(id).map(|s| s.seq).unwrap_or(seq);
        coll.insert(id.to_string(), Stored { seq, doc });
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError> {
        let mut coll = self.collections.entry(collection.to_string()).or_default();
        let stored = coll.get_mut(id).ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
        merge_fields(&mut stored.doc, patch)
    }

    async fn add(&self, collection: &str, doc: Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let seq = self.next_seq();
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), Stored { seq, doc });
        Ok(id)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Value)>, StoreError> {
        let Some(coll) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<(&String, &Stored)> = coll.iter().filter(|(_, s)| query.matches(&s.doc)).collect();

        let (field, direction) = query
            .order_by
            .clone()
            .unwrap_or_else(|| (String::new(), Direction::Ascending));
        hits.sort_by(|(_, a), (_, b)| {
            let primary = if field.is_empty() {
                Ordering::Equal
            } else {
                compare_values(a.doc.get(&field), b.doc.get(&field))
            };
            let ord = primary.then(a.seq.cmp(&b.seq));
            match direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(id, s)| (id.clone(), s.doc.clone()))
            .collect())
    }

    async fn transact(&self, collection: &str, id: &str, mutation: Mutation) -> Result<Value, StoreError> {
        let seq = self.next_seq();
        let mut coll = self.collections.entry(collection.to_string()).or_default();
        let current = coll.get(id);
        let seq = current.map(|s| s.seq).unwrap_or(seq);
        let next = mutation(current.map(|s| &s.doc))?;
        coll.insert(
            id.to_string(),
            Stored {
                seq,
                doc: next.clone(),
            },
        );
        Ok(next)
    }
}
