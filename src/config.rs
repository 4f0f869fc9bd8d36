//! Bucket configuration plus CLI/environment settings for the binary.

use crate::collection::Document;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use uuid::Uuid;

/// Default bucket namespace; collections become `fs.files` / `fs.chunks`.
pub const DEFAULT_BUCKET_NAME: &str = "fs";

/// Default chunk size: 255 KiB.
pub const DEFAULT_CHUNK_SIZE_BYTES: u32 = 261_120;

/// Construction-time bucket configuration, fixed for the bucket's lifetime.
#[derive(Clone, Debug)]
pub struct BucketOptions {
    /// Namespace shared by the two underlying collections.
    pub bucket_name: String,

    /// Bytes per chunk for new uploads. Individual uploads may override it.
    pub chunk_size_bytes: u32,

    /// Opaque read policy forwarded to both collections unchanged.
    pub read_policy: Option<Document>,

    /// Opaque write policy forwarded to both collections unchanged.
    pub write_policy: Option<Document>,
}

impl Default for BucketOptions {
    fn default() -> Self {
        Self {
            bucket_name: DEFAULT_BUCKET_NAME.to_string(),
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            read_policy: None,
            write_policy: None,
        }
    }
}

/// Centralized configuration for the `gridstore` binary.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bucket_name: String,
    pub chunk_size_bytes: u32,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked file storage over a document collection")]
pub struct Args {
    /// SQLite database URL (overrides GRIDSTORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket name (overrides GRIDSTORE_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Chunk size in bytes (overrides GRIDSTORE_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a file and print its id
    Put {
        path: PathBuf,
        /// Stored filename (defaults to the file's basename)
        #[arg(long)]
        name: Option<String>,
    },
    /// Download a file by id
    Get { id: Uuid, output: PathBuf },
    /// List stored files
    Ls,
    /// Delete a file by id
    Rm { id: Uuid },
    /// Drop the whole bucket. Irreversible.
    Drop,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();

        let env_db = env::var("GRIDSTORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./gridstore.db".into());
        let env_bucket =
            env::var("GRIDSTORE_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET_NAME.into());
        let env_chunk_size = match env::var("GRIDSTORE_CHUNK_SIZE") {
            Ok(value) => value
                .parse::<u32>()
                .with_context(|| format!("parsing GRIDSTORE_CHUNK_SIZE value `{}`", value))?,
            Err(env::VarError::NotPresent) => DEFAULT_CHUNK_SIZE_BYTES,
            Err(err) => return Err(err).context("reading GRIDSTORE_CHUNK_SIZE"),
        };

        let cfg = Self {
            database_url: args.database_url.unwrap_or(env_db),
            bucket_name: args.bucket.unwrap_or(env_bucket),
            chunk_size_bytes: args.chunk_size.unwrap_or(env_chunk_size),
        };

        Ok((cfg, args.command))
    }

    pub fn bucket_options(&self) -> BucketOptions {
        BucketOptions {
            bucket_name: self.bucket_name.clone(),
            chunk_size_bytes: self.chunk_size_bytes,
            ..BucketOptions::default()
        }
    }
}
