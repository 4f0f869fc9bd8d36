//! Bucket orchestration: the bucket itself plus its upload-side and
//! download-side scoped resources.

pub mod bucket;
pub mod download;
pub mod upload;

pub use bucket::{Bucket, FileRecordStream};
pub use download::{ByteSink, DownloadSource, WriterSink};
pub use upload::{UploadOptions, UploadSink};

use crate::collection::Document;
use crate::models::FileId;
use serde_json::json;

pub(crate) fn id_filter(id: &FileId) -> Document {
    Document::from_iter([("_id".to_string(), json!(id))])
}

pub(crate) fn files_id_filter(id: &FileId) -> Document {
    Document::from_iter([("files_id".to_string(), json!(id))])
}
