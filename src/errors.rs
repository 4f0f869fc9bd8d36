//! Error taxonomy for bucket operations.

use crate::collection::CollectionError;
use crate::models::FileId;
use std::io;
use thiserror::Error;

/// Every way a bucket operation can fail.
///
/// All variants are terminal: nothing in this layer retries. A caller-level
/// retry re-opens the affected upload or download from scratch. Collection
/// I/O failures propagate unchanged through the `Collection` variant.
#[derive(Debug, Error)]
pub enum BucketError {
    /// Download or delete target absent, or a delete matched a count other
    /// than exactly one.
    #[error("file `{0}` not found")]
    FileNotFound(FileId),

    /// The chunk sequence ended before the expected index was reached.
    #[error("missing chunk {0}")]
    MissingChunk(u32),

    /// A chunk arrived out of order or with a duplicated index.
    #[error("unexpected chunk index: expected {expected}, got {actual}")]
    UnexpectedChunkIndex { expected: u32, actual: u32 },

    /// A chunk's payload length does not match what the file record implies.
    #[error("chunk {n} has {actual} bytes, expected {expected}")]
    ChunkSizeMismatch {
        n: u32,
        expected: usize,
        actual: usize,
    },

    /// More chunk records exist than the file length implies.
    #[error("extra chunk records past index {last}")]
    ExtraChunks { last: u32 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BucketResult<T> = Result<T, BucketError>;
