//! Chunk codec: pure construction of chunk and file records, plus the
//! chunk-count arithmetic both the upload and download paths share.
//!
//! No I/O happens here. The codec is configured explicitly at construction;
//! there is no process-global state.

use crate::collection::Document;
use crate::models::{ChunkRecord, FileId, FileRecord};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Construction-time configuration for a [`ChunkCodec`].
#[derive(Clone, Copy, Debug)]
pub struct CodecConfig {
    /// Bytes per chunk. Must be nonzero; validated by the bucket before a
    /// codec is built.
    pub chunk_size: u32,
}

/// Per-file codec: knows the owning file id and its chunk size.
#[derive(Clone, Debug)]
pub struct ChunkCodec {
    files_id: FileId,
    config: CodecConfig,
}

impl ChunkCodec {
    pub fn new(files_id: FileId, config: CodecConfig) -> Self {
        debug_assert!(config.chunk_size > 0);
        Self { files_id, config }
    }

    pub fn chunk_size(&self) -> u32 {
        self.config.chunk_size
    }

    pub fn files_id(&self) -> FileId {
        self.files_id
    }

    /// Build the chunk record for index `n`.
    pub fn chunk_record(&self, n: u32, data: Vec<u8>) -> ChunkRecord {
        ChunkRecord {
            id: Uuid::new_v4(),
            files_id: self.files_id,
            n,
            data,
        }
    }

    /// Build the file record committed at upload completion.
    pub fn file_record(
        &self,
        filename: String,
        length: u64,
        upload_date: DateTime<Utc>,
        md5: Option<String>,
        metadata: Option<Document>,
    ) -> FileRecord {
        FileRecord {
            id: self.files_id,
            filename,
            length,
            chunk_size: self.config.chunk_size,
            upload_date,
            md5,
            metadata,
        }
    }

    /// Number of chunks a file of `length` bytes occupies: `ceil(L / C)`.
    /// Zero chunks iff the file is empty. A length that is an exact multiple
    /// of the chunk size yields `L / C` chunks, never a trailing empty one.
    pub fn chunk_count(&self, length: u64) -> u64 {
        length.div_ceil(u64::from(self.config.chunk_size))
    }

    /// Index of the final chunk, or `None` for an empty file.
    pub fn last_index(&self, length: u64) -> Option<u64> {
        self.chunk_count(length).checked_sub(1)
    }

    /// Byte length chunk `n` must carry for a file of `length` bytes: the
    /// full chunk size everywhere except the final chunk, which carries
    /// `L mod C` bytes unless that is zero, in which case it is full-size.
    pub fn expected_chunk_len(&self, n: u64, length: u64) -> usize {
        let chunk_size = u64::from(self.config.chunk_size);
        debug_assert!(n < self.chunk_count(length));
        if n + 1 < self.chunk_count(length) {
            chunk_size as usize
        } else {
            let remainder = length % chunk_size;
            if remainder == 0 {
                chunk_size as usize
            } else {
                remainder as usize
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(chunk_size: u32) -> ChunkCodec {
        ChunkCodec::new(Uuid::new_v4(), CodecConfig { chunk_size })
    }

    #[test]
    fn chunk_count_rounds_up() {
        let c = codec(4);
        assert_eq!(c.chunk_count(0), 0);
        assert_eq!(c.chunk_count(1), 1);
        assert_eq!(c.chunk_count(4), 1);
        assert_eq!(c.chunk_count(5), 2);
        assert_eq!(c.chunk_count(9), 3);
    }

    #[test]
    fn last_index_for_nine_bytes_over_four() {
        // "ABCDEFGHI" with chunk size 4: chunks of 4, 4, 1.
        let c = codec(4);
        assert_eq!(c.last_index(9), Some(2));
        assert_eq!(c.expected_chunk_len(0, 9), 4);
        assert_eq!(c.expected_chunk_len(1, 9), 4);
        assert_eq!(c.expected_chunk_len(2, 9), 1);
    }

    #[test]
    fn exact_multiple_has_full_size_final_chunk() {
        // "ABCDEFGH" with chunk size 4: exactly 2 chunks, no phantom third.
        let c = codec(4);
        assert_eq!(c.chunk_count(8), 2);
        assert_eq!(c.last_index(8), Some(1));
        assert_eq!(c.expected_chunk_len(1, 8), 4);
    }

    #[test]
    fn empty_file_has_no_chunks() {
        let c = codec(261_120);
        assert_eq!(c.chunk_count(0), 0);
        assert_eq!(c.last_index(0), None);
    }

    #[test]
    fn file_record_carries_codec_chunk_size() {
        let c = codec(16);
        let record = c.file_record("a.bin".into(), 33, Utc::now(), None, None);
        assert_eq!(record.chunk_size, 16);
        assert_eq!(record.length, 33);
    }
}
