//! src/services/bucket.rs
//!
//! Bucket — chunked file storage over a pair of document collections,
//! `<name>.files` for metadata records and `<name>.chunks` for the payload
//! segments. The bucket holds no state between calls; upload state lives in
//! the [`UploadSink`] handle for the duration of one write sequence.

use crate::codec::{ChunkCodec, CodecConfig};
use crate::collection::{
    Collection, CollectionOptions, Database, Document, FindOptions, SortOrder, from_document,
};
use crate::config::BucketOptions;
use crate::errors::{BucketError, BucketResult};
use crate::models::{FileId, FileRecord};
use crate::services::download::{ByteSink, DownloadSource};
use crate::services::upload::{UploadOptions, UploadSink};
use crate::services::{files_id_filter, id_filter};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

/// A lazy sequence of file records produced by [`Bucket::find`].
pub type FileRecordStream = Pin<Box<dyn Stream<Item = BucketResult<FileRecord>> + Send>>;

const BUCKET_NAME_MAX_LEN: usize = 64;

/// Chunked object storage over two named collections.
///
/// Every public operation is a complete, independently retriable unit of
/// work. Concurrent operations on different files share nothing beyond the
/// underlying collections, which provide per-document atomicity only.
pub struct Bucket {
    files: Arc<dyn Collection>,
    chunks: Arc<dyn Collection>,
    options: BucketOptions,
    indexes: OnceCell<()>,
}

impl Bucket {
    /// Open a bucket over `db`. Validates the bucket name and chunk size;
    /// creates nothing until the first write operation.
    pub fn new(db: &dyn Database, options: BucketOptions) -> BucketResult<Self> {
        ensure_bucket_name_safe(&options.bucket_name)?;
        if options.chunk_size_bytes == 0 {
            return Err(BucketError::InvalidArgument(
                "chunk size must be nonzero".into(),
            ));
        }
        let coll_options = CollectionOptions {
            read_policy: options.read_policy.clone(),
            write_policy: options.write_policy.clone(),
        };
        let files = db.collection(
            &format!("{}.files", options.bucket_name),
            coll_options.clone(),
        );
        let chunks = db.collection(&format!("{}.chunks", options.bucket_name), coll_options);
        Ok(Self {
            files,
            chunks,
            options,
            indexes: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.options.bucket_name
    }

    pub fn chunk_size_bytes(&self) -> u32 {
        self.options.chunk_size_bytes
    }

    /// Idempotently create the `(filename, uploadDate)` index on the files
    /// collection and the `(files_id, n)` index the ordered chunk scan
    /// relies on. Runs at most once per bucket, lazily before the first
    /// write, so read-only buckets never pay for it.
    pub async fn ensure_indexes(&self) -> BucketResult<()> {
        self.indexes
            .get_or_try_init(|| async {
                self.files
                    .create_index(&[
                        ("filename", SortOrder::Ascending),
                        ("uploadDate", SortOrder::Ascending),
                    ])
                    .await?;
                self.chunks
                    .create_index(&[
                        ("files_id", SortOrder::Ascending),
                        ("n", SortOrder::Ascending),
                    ])
                    .await?;
                debug!(bucket = %self.options.bucket_name, "created bucket indexes");
                Ok::<(), BucketError>(())
            })
            .await?;
        Ok(())
    }

    /// Open a write handle. Bytes written to the sink are chunked and
    /// persisted as they accumulate; nothing is visible to readers until
    /// [`UploadSink::close`] commits the file record.
    pub async fn open_upload_sink(
        &self,
        filename: impl Into<String>,
        options: UploadOptions,
    ) -> BucketResult<UploadSink> {
        self.ensure_indexes().await?;
        let chunk_size = options
            .chunk_size_bytes
            .unwrap_or(self.options.chunk_size_bytes);
        if chunk_size == 0 {
            return Err(BucketError::InvalidArgument(
                "chunk size must be nonzero".into(),
            ));
        }
        let file_id = options.file_id.unwrap_or_else(Uuid::new_v4);
        let codec = ChunkCodec::new(file_id, CodecConfig { chunk_size });
        Ok(UploadSink::new(
            self.files.clone(),
            self.chunks.clone(),
            codec,
            filename.into(),
            options.metadata,
        ))
    }

    /// Drive an upload from a byte stream and commit it.
    ///
    /// On any failure the chunks already persisted stay behind as invisible
    /// garbage; no file record is ever written for a failed upload.
    pub async fn upload_from_stream<S>(
        &self,
        filename: impl Into<String>,
        options: UploadOptions,
        stream: S,
    ) -> BucketResult<FileRecord>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let mut sink = self.open_upload_sink(filename, options).await?;
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            sink.write(&chunk?).await?;
        }
        sink.close().await
    }

    /// Open a validated read stream for `id`.
    ///
    /// Fails with [`BucketError::FileNotFound`] when no file record matches.
    /// The returned source is lazy, finite, and non-restartable; any
    /// structural inconsistency among the chunks is terminal.
    pub async fn open_download(&self, id: FileId) -> BucketResult<DownloadSource> {
        let Some(doc) = self.files.find_one(&id_filter(&id)).await? else {
            return Err(BucketError::FileNotFound(id));
        };
        let record: FileRecord = from_document(doc)?;
        if record.chunk_size == 0 && record.length > 0 {
            return Err(BucketError::InvalidArgument(format!(
                "file `{id}` has zero chunk size"
            )));
        }
        let codec = ChunkCodec::new(
            record.id,
            CodecConfig {
                chunk_size: record.chunk_size.max(1),
            },
        );
        let cursor = self
            .chunks
            .find(files_id_filter(&id), FindOptions::sorted_by("n"))
            .await?;
        Ok(DownloadSource::new(record, codec, cursor))
    }

    /// Stream the file's bytes into `sink`. Returns the byte count written.
    ///
    /// Bytes already handed to the sink before a validation failure are not
    /// retracted.
    pub async fn download_to(&self, id: FileId, sink: &mut dyn ByteSink) -> BucketResult<u64> {
        let mut source = self.open_download(id).await?;
        let mut written = 0u64;
        while let Some(chunk) = source.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            sink.accept(chunk).await?;
        }
        Ok(written)
    }

    /// Delete the file record for `id`, then sweep all of its chunks.
    ///
    /// The file record goes first: a failure between the two deletes leaves
    /// orphaned chunks (invisible garbage) rather than a readable-looking but
    /// unreadable file. A match count other than exactly one reports
    /// [`BucketError::FileNotFound`] after the sweep.
    pub async fn delete(&self, id: FileId) -> BucketResult<()> {
        let deleted = self.files.delete_one(&id_filter(&id)).await?;
        let swept = self.chunks.delete_many(&files_id_filter(&id)).await?;
        debug!(%id, swept, "swept chunk records");
        if deleted != 1 {
            return Err(BucketError::FileNotFound(id));
        }
        Ok(())
    }

    /// Find file records matching `filter`. Touches only the files
    /// collection; chunk payloads are never read.
    pub async fn find(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> BucketResult<FileRecordStream> {
        let docs = self.files.find(filter, options).await?;
        Ok(Box::pin(docs.map(|res| -> BucketResult<FileRecord> {
            let doc = res?;
            Ok(from_document::<FileRecord>(doc)?)
        })))
    }

    /// Remove both underlying collections entirely. Irreversible.
    pub async fn drop(&self) -> BucketResult<()> {
        Collection::drop(self.files.as_ref()).await?;
        Collection::drop(self.chunks.as_ref()).await?;
        debug!(bucket = %self.options.bucket_name, "dropped bucket collections");
        Ok(())
    }
}

/// Bucket names become collection (and with the SQLite backend, table)
/// names; keep them to a predictable character set.
fn ensure_bucket_name_safe(name: &str) -> BucketResult<()> {
    if name.is_empty() || name.len() > BUCKET_NAME_MAX_LEN {
        return Err(BucketError::InvalidArgument(format!(
            "bucket name `{name}` must be between 1 and {BUCKET_NAME_MAX_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
    {
        return Err(BucketError::InvalidArgument(format!(
            "bucket name `{name}` may contain only letters, digits, `_` and `-`"
        )));
    }
    Ok(())
}
