//! Document-collection capability consumed by the bucket.
//!
//! The bucket core never talks to a concrete store; it drives the
//! [`Collection`] trait, which models the small slice of a document database
//! this layer needs: insert, delete-by-filter, sorted/filtered lazy find,
//! drop, and index creation. Filters are equality-match documents. Two
//! backends ship with the crate: an in-memory one for tests and a SQLite one
//! for the CLI.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

pub use memory::MemoryDatabase;
pub use sqlite::SqliteDatabase;

/// A document: an ordered map of field name to JSON value.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// A boxed lazy sequence of documents produced by `find`.
pub type DocumentStream = Pin<Box<dyn Stream<Item = CollectionResult<Document>> + Send>>;

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type CollectionResult<T> = Result<T, CollectionError>;

/// Sort direction for `find` and index key specs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Options accepted by [`Collection::find`].
#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    /// Sort keys applied in order.
    pub sort: Vec<(String, SortOrder)>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Sort ascending by a single field.
    pub fn sorted_by(field: impl Into<String>) -> Self {
        Self {
            sort: vec![(field.into(), SortOrder::Ascending)],
            limit: None,
        }
    }
}

/// Opaque read/write policy documents forwarded to a collection unchanged.
///
/// The bucket neither inspects nor merges these; backends that have no notion
/// of per-collection policy ignore them.
#[derive(Clone, Debug, Default)]
pub struct CollectionOptions {
    pub read_policy: Option<Document>,
    pub write_policy: Option<Document>,
}

/// Ordered storage of documents keyed by an identifier field.
///
/// Backends guarantee per-document atomicity only; there is no cross-document
/// transaction at this layer.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Insert a single document.
    async fn insert_one(&self, doc: Document) -> CollectionResult<()>;

    /// Delete the first document matching `filter`; returns the count (0 or 1).
    async fn delete_one(&self, filter: &Document) -> CollectionResult<u64>;

    /// Delete every document matching `filter`; returns the count.
    async fn delete_many(&self, filter: &Document) -> CollectionResult<u64>;

    /// Lazy sequence of documents matching `filter`, sorted and limited per
    /// `options`.
    async fn find(&self, filter: Document, options: FindOptions) -> CollectionResult<DocumentStream>;

    /// First document matching `filter`, if any.
    async fn find_one(&self, filter: &Document) -> CollectionResult<Option<Document>>;

    /// Remove the collection entirely. Irreversible.
    async fn drop(&self) -> CollectionResult<()>;

    /// Idempotently create an index over the given keys.
    async fn create_index(&self, keys: &[(&str, SortOrder)]) -> CollectionResult<()>;
}

/// Hands out named collections. Implemented by every backend.
pub trait Database: Send + Sync {
    /// Obtain (creating lazily if needed) the collection with `name`,
    /// forwarding the policy options unchanged.
    fn collection(&self, name: &str, options: CollectionOptions) -> Arc<dyn Collection>;
}

/// Serialize a value into its document form.
pub fn to_document<T: Serialize>(value: &T) -> CollectionResult<Document> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(CollectionError::Malformed(format!(
            "expected a document, got {other}"
        ))),
    }
}

/// Deserialize a document into a typed record.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> CollectionResult<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(doc))?)
}
