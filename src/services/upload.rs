//! Upload Sink — the write-side scoped resource of a bucket.
//!
//! Buffers incoming bytes into chunk-sized records and persists each full
//! chunk as soon as it forms. Closing the sink commits the file record,
//! which is the public "file now exists" signal. Dropping a sink without
//! closing leaves orphaned chunks behind, never a partial file record.

use crate::codec::ChunkCodec;
use crate::collection::{Collection, Document, to_document};
use crate::errors::BucketResult;
use crate::models::{FileId, FileRecord};
use crate::services::files_id_filter;
use bytes::BytesMut;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Per-upload options.
#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    /// Caller-supplied file id; generated when absent. Collision avoidance
    /// is the caller's responsibility.
    pub file_id: Option<FileId>,

    /// Per-file chunk size override.
    pub chunk_size_bytes: Option<u32>,

    /// Opaque caller-supplied document stored on the file record.
    pub metadata: Option<Document>,
}

/// Buffering write handle returned by `Bucket::open_upload_sink`.
///
/// `close` and `abort` consume the handle, so no operation is possible on a
/// finished upload.
pub struct UploadSink {
    files: Arc<dyn Collection>,
    chunks: Arc<dyn Collection>,
    codec: ChunkCodec,
    filename: String,
    metadata: Option<Document>,
    buffer: BytesMut,
    next_index: u32,
    length: u64,
    digest: md5::Context,
}

impl UploadSink {
    pub(crate) fn new(
        files: Arc<dyn Collection>,
        chunks: Arc<dyn Collection>,
        codec: ChunkCodec,
        filename: String,
        metadata: Option<Document>,
    ) -> Self {
        Self {
            files,
            chunks,
            codec,
            filename,
            metadata,
            buffer: BytesMut::new(),
            next_index: 0,
            length: 0,
            digest: md5::Context::new(),
        }
    }

    /// The id the file record will carry once committed.
    pub fn id(&self) -> FileId {
        self.codec.files_id()
    }

    /// Bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.length
    }

    /// Accept a slice of any size. Every time the internal buffer reaches
    /// the chunk size, one chunk record is persisted immediately.
    ///
    /// A persistence failure aborts the upload; chunks already written stay
    /// in place as garbage no file record will ever reference.
    pub async fn write(&mut self, buf: &[u8]) -> BucketResult<()> {
        self.digest.consume(buf);
        self.length += buf.len() as u64;
        self.buffer.extend_from_slice(buf);
        let chunk_size = self.codec.chunk_size() as usize;
        while self.buffer.len() >= chunk_size {
            let data = self.buffer.split_to(chunk_size).freeze();
            self.persist_chunk(data.to_vec()).await?;
        }
        Ok(())
    }

    /// Flush any partial final chunk, then commit the file record with the
    /// total length and completion timestamp. Zero bytes written means zero
    /// chunks and a zero-length file record.
    pub async fn close(mut self) -> BucketResult<FileRecord> {
        if !self.buffer.is_empty() {
            let data = self.buffer.split().freeze();
            self.persist_chunk(data.to_vec()).await?;
        }
        let md5 = format!("{:x}", self.digest.compute());
        let record = self.codec.file_record(
            self.filename,
            self.length,
            Utc::now(),
            Some(md5),
            self.metadata,
        );
        self.files.insert_one(to_document(&record)?).await?;
        debug!(id = %record.id, length = record.length, chunks = self.next_index, "upload committed");
        Ok(record)
    }

    /// Abandon the upload and best-effort sweep the chunks written so far.
    /// No file record is written.
    pub async fn abort(self) -> BucketResult<()> {
        let id = self.codec.files_id();
        let swept = self.chunks.delete_many(&files_id_filter(&id)).await?;
        debug!(%id, swept, "aborted upload");
        Ok(())
    }

    async fn persist_chunk(&mut self, data: Vec<u8>) -> BucketResult<()> {
        let record = self.codec.chunk_record(self.next_index, data);
        debug!(files_id = %record.files_id, n = record.n, len = record.data.len(), "persisting chunk");
        self.chunks.insert_one(to_document(&record)?).await?;
        self.next_index += 1;
        Ok(())
    }
}
