//! Download Source — the read-side lazy sequence of a bucket.
//!
//! Fetches chunk records in index order and yields validated byte ranges.
//! Any structural inconsistency (a gap, an out-of-order index, a wrong-sized
//! payload, records past the final index) fails the stream before the bad
//! bytes are emitted, and the failure is terminal: retrying means re-opening
//! the download from scratch.

use crate::codec::ChunkCodec;
use crate::collection::{DocumentStream, from_document};
use crate::errors::{BucketError, BucketResult};
use crate::models::{ChunkRecord, FileRecord};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Consumer of downloaded byte ranges, one `accept` call per chunk.
///
/// Deliberately independent of any particular I/O handle type; adapters are
/// provided for `AsyncWrite` handles and plain byte buffers.
#[async_trait]
pub trait ByteSink: Send {
    async fn accept(&mut self, bytes: Bytes) -> io::Result<()>;
}

#[async_trait]
impl ByteSink for Vec<u8> {
    async fn accept(&mut self, bytes: Bytes) -> io::Result<()> {
        self.extend_from_slice(&bytes);
        Ok(())
    }
}

/// Adapts any `AsyncWrite` into a [`ByteSink`].
pub struct WriterSink<W>(W);

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self(writer)
    }

    pub fn into_inner(self) -> W {
        self.0
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ByteSink for WriterSink<W> {
    async fn accept(&mut self, bytes: Bytes) -> io::Result<()> {
        self.0.write_all(&bytes).await
    }
}

/// Lazy, finite, non-restartable stream of a file's validated chunks.
///
/// For each expected index the next record must exist, carry exactly that
/// index, and hold exactly the byte count the file record implies. After the
/// final index, one more record from the cursor means the chunk set is
/// larger than the file length allows.
pub struct DownloadSource {
    record: FileRecord,
    codec: ChunkCodec,
    cursor: DocumentStream,
    chunk_count: u64,
    next_index: u64,
    finished: bool,
}

impl DownloadSource {
    pub(crate) fn new(record: FileRecord, codec: ChunkCodec, cursor: DocumentStream) -> Self {
        let chunk_count = codec.chunk_count(record.length);
        Self {
            record,
            codec,
            cursor,
            chunk_count,
            next_index: 0,
            finished: false,
        }
    }

    /// The file record this download was opened against.
    pub fn file(&self) -> &FileRecord {
        &self.record
    }

    fn fail(&mut self, err: BucketError) -> Poll<Option<BucketResult<Bytes>>> {
        self.finished = true;
        Poll::Ready(Some(Err(err)))
    }
}

impl Stream for DownloadSource {
    type Item = BucketResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        // A zero-length file yields nothing, no matter what chunk documents
        // exist for its id.
        if this.chunk_count == 0 {
            this.finished = true;
            return Poll::Ready(None);
        }
        match ready!(this.cursor.as_mut().poll_next(cx)) {
            None => {
                this.finished = true;
                if this.next_index >= this.chunk_count {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Err(BucketError::MissingChunk(this.next_index as u32))))
                }
            }
            Some(Err(err)) => this.fail(err.into()),
            Some(Ok(doc)) => {
                if this.next_index >= this.chunk_count {
                    let last = (this.chunk_count - 1) as u32;
                    return this.fail(BucketError::ExtraChunks { last });
                }
                let chunk: ChunkRecord = match from_document(doc) {
                    Ok(chunk) => chunk,
                    Err(err) => return this.fail(err.into()),
                };
                if u64::from(chunk.n) != this.next_index {
                    return this.fail(BucketError::UnexpectedChunkIndex {
                        expected: this.next_index as u32,
                        actual: chunk.n,
                    });
                }
                let expected = this
                    .codec
                    .expected_chunk_len(this.next_index, this.record.length);
                if chunk.data.len() != expected {
                    return this.fail(BucketError::ChunkSizeMismatch {
                        n: chunk.n,
                        expected,
                        actual: chunk.data.len(),
                    });
                }
                this.next_index += 1;
                Poll::Ready(Some(Ok(Bytes::from(chunk.data))))
            }
        }
    }
}
