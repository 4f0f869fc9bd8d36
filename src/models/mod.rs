//! Persisted document models for the bucket's two collections.
//!
//! These map one-to-one onto the stored document layout: file records live in
//! `<bucket>.files`, chunk records in `<bucket>.chunks`. Both serialize via
//! `serde` into plain JSON documents.

pub mod chunk;
pub mod file;

pub use chunk::ChunkRecord;
pub use file::FileRecord;

/// Identifier of a stored file. Opaque to the bucket; caller-supplied or
/// generated at upload time, immutable afterwards.
pub type FileId = uuid::Uuid;
