//! gridstore — chunked binary object storage over a document collection.
//!
//! A bucket owns two collections: `<name>.files` for one metadata record per
//! stored object and `<name>.chunks` for its fixed-size payload segments.
//! Uploads buffer bytes into chunk records and commit the file record last;
//! downloads re-validate index density and chunk lengths as they stream.
//!
//! The collection substrate is a trait ([`collection::Collection`]); an
//! in-memory backend and a SQLite backend ship with the crate.

pub mod codec;
pub mod collection;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;

pub use config::BucketOptions;
pub use errors::{BucketError, BucketResult};
pub use models::{ChunkRecord, FileId, FileRecord};
pub use services::{Bucket, ByteSink, DownloadSource, UploadOptions, UploadSink, WriterSink};
