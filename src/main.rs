use anyhow::Result;
use futures::StreamExt;
use gridstore::collection::{Document, FindOptions, SqliteDatabase};
use gridstore::config::{AppConfig, Command};
use gridstore::{Bucket, UploadOptions, WriterSink};
use tokio_util::io::ReaderStream;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (cfg, command) = AppConfig::from_env_and_args()?;
    tracing::debug!("starting gridstore with config: {:?}", cfg);

    let db = SqliteDatabase::connect(&cfg.database_url).await?;
    let bucket = Bucket::new(&db, cfg.bucket_options())?;

    match command {
        Command::Put { path, name } => {
            let filename = name.unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            });
            let file = tokio::fs::File::open(&path).await?;
            let record = bucket
                .upload_from_stream(filename, UploadOptions::default(), ReaderStream::new(file))
                .await?;
            tracing::info!(length = record.length, "upload complete");
            println!("{}", record.id);
        }
        Command::Get { id, output } => {
            let file = tokio::fs::File::create(&output).await?;
            let mut sink = WriterSink::new(file);
            let written = bucket.download_to(id, &mut sink).await?;
            sink.into_inner().sync_all().await?;
            tracing::info!(%id, written, "download complete");
        }
        Command::Ls => {
            let mut files = bucket.find(Document::new(), FindOptions::default()).await?;
            while let Some(record) = files.next().await {
                let record = record?;
                println!(
                    "{}\t{:>10}\t{}\t{}",
                    record.id,
                    record.length,
                    record.upload_date.to_rfc3339(),
                    record.filename
                );
            }
        }
        Command::Rm { id } => {
            bucket.delete(id).await?;
            tracing::info!(%id, "deleted");
        }
        Command::Drop => {
            bucket.drop().await?;
            tracing::info!(bucket = %cfg.bucket_name, "bucket dropped");
        }
    }

    Ok(())
}
