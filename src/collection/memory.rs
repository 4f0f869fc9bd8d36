//! In-memory collection backend.
//!
//! Backs the test suite. Handles are shared per name, so a test can obtain
//! the same collection the bucket writes to and tamper with its documents.

use super::{
    Collection, CollectionOptions, CollectionResult, Database, Document, DocumentStream,
    FindOptions, SortOrder,
};
use async_trait::async_trait;
use futures::stream;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-process database handing out [`MemoryCollection`] handles by name.
#[derive(Default)]
pub struct MemoryDatabase {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Database for MemoryDatabase {
    fn collection(&self, name: &str, _options: CollectionOptions) -> Arc<dyn Collection> {
        let mut map = self.collections.write().expect("collection map poisoned");
        map.entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::default()))
            .clone()
    }
}

/// A single in-memory collection: a locked vector of documents.
#[derive(Default)]
pub struct MemoryCollection {
    docs: RwLock<Vec<Document>>,
}

impl MemoryCollection {
    fn with_docs<R>(&self, f: impl FnOnce(&Vec<Document>) -> R) -> R {
        f(&self.docs.read().expect("collection poisoned"))
    }

    fn with_docs_mut<R>(&self, f: impl FnOnce(&mut Vec<Document>) -> R) -> R {
        f(&mut self.docs.write().expect("collection poisoned"))
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn insert_one(&self, doc: Document) -> CollectionResult<()> {
        self.with_docs_mut(|docs| docs.push(doc));
        Ok(())
    }

    async fn delete_one(&self, filter: &Document) -> CollectionResult<u64> {
        Ok(self.with_docs_mut(|docs| {
            match docs.iter().position(|doc| matches_filter(doc, filter)) {
                Some(idx) => {
                    docs.remove(idx);
                    1
                }
                None => 0,
            }
        }))
    }

    async fn delete_many(&self, filter: &Document) -> CollectionResult<u64> {
        Ok(self.with_docs_mut(|docs| {
            let before = docs.len();
            docs.retain(|doc| !matches_filter(doc, filter));
            (before - docs.len()) as u64
        }))
    }

    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> CollectionResult<DocumentStream> {
        let mut matched: Vec<Document> = self.with_docs(|docs| {
            docs.iter()
                .filter(|doc| matches_filter(doc, &filter))
                .cloned()
                .collect()
        });
        for (field, order) in options.sort.iter().rev() {
            matched.sort_by(|a, b| {
                let ordering = compare_fields(a.get(field), b.get(field));
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = options.limit {
            matched.truncate(limit);
        }
        Ok(Box::pin(stream::iter(matched.into_iter().map(Ok))))
    }

    async fn find_one(&self, filter: &Document) -> CollectionResult<Option<Document>> {
        Ok(self.with_docs(|docs| {
            docs.iter()
                .find(|doc| matches_filter(doc, filter))
                .cloned()
        }))
    }

    async fn drop(&self) -> CollectionResult<()> {
        self.with_docs_mut(|docs| docs.clear());
        Ok(())
    }

    async fn create_index(&self, _keys: &[(&str, SortOrder)]) -> CollectionResult<()> {
        Ok(())
    }
}

/// Equality match: every filter field must be present and equal.
fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, value)| doc.get(key) == Some(value))
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

/// Total order over JSON values: rank by type, then compare within the type.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn find_sorts_and_limits() {
        let coll = MemoryCollection::default();
        for n in [2, 0, 1] {
            coll.insert_one(doc(&[("n", json!(n)), ("kind", json!("x"))]))
                .await
                .unwrap();
        }
        let found: Vec<Document> = coll
            .find(
                doc(&[("kind", json!("x"))]),
                FindOptions {
                    sort: vec![("n".into(), SortOrder::Ascending)],
                    limit: Some(2),
                },
            )
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let indices: Vec<i64> = found
            .iter()
            .map(|d| d.get("n").and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn delete_one_removes_a_single_match() {
        let coll = MemoryCollection::default();
        coll.insert_one(doc(&[("k", json!("a"))])).await.unwrap();
        coll.insert_one(doc(&[("k", json!("a"))])).await.unwrap();
        assert_eq!(coll.delete_one(&doc(&[("k", json!("a"))])).await.unwrap(), 1);
        assert_eq!(coll.delete_many(&doc(&[("k", json!("a"))])).await.unwrap(), 1);
        assert_eq!(coll.delete_one(&doc(&[("k", json!("a"))])).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn database_shares_handles_by_name() {
        let db = MemoryDatabase::new();
        let a = db.collection("fs.files", CollectionOptions::default());
        a.insert_one(doc(&[("k", json!(1))])).await.unwrap();
        let b = db.collection("fs.files", CollectionOptions::default());
        assert!(b.find_one(&Document::new()).await.unwrap().is_some());
    }
}
