//! Represents the metadata record of a stored file.

use crate::collection::Document;
use crate::models::FileId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata document describing one stored object, persisted in
/// `<bucket>.files`.
///
/// A `FileRecord` is written exactly once, at the end of a successful upload;
/// its existence is the durable signal that every chunk it references was
/// present and correct at that moment. It is never updated afterwards, only
/// deleted.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Primary key of the files collection.
    #[serde(rename = "_id")]
    pub id: FileId,

    /// Display name. Not unique and never used for lookup by the bucket.
    pub filename: String,

    /// Total byte count of the object, set at upload completion.
    pub length: u64,

    /// Bytes per chunk for this object. Fixed at upload start and stored so
    /// downloads never need an external default.
    pub chunk_size: u32,

    /// When the upload completed (not when it began).
    pub upload_date: DateTime<Utc>,

    /// Hex MD5 digest of the full contents, computed while streaming in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,

    /// Optional caller-supplied opaque document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
}
