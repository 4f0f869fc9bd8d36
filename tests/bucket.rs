//! End-to-end bucket tests over the in-memory and SQLite collection
//! backends, including tampering with stored chunk documents to exercise the
//! download validation paths.

use futures::StreamExt;
use gridstore::collection::{
    Collection, CollectionOptions, Database, Document, FindOptions, MemoryDatabase,
    SqliteDatabase, from_document, to_document,
};
use gridstore::{Bucket, BucketError, BucketOptions, ChunkRecord, FileId, FileRecord, UploadOptions};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use uuid::Uuid;

fn bucket_with(db: &dyn Database, chunk_size: u32) -> Bucket {
    Bucket::new(
        db,
        BucketOptions {
            chunk_size_bytes: chunk_size,
            ..BucketOptions::default()
        },
    )
    .unwrap()
}

fn chunks_of(db: &dyn Database) -> Arc<dyn Collection> {
    db.collection("fs.chunks", CollectionOptions::default())
}

fn files_of(db: &dyn Database) -> Arc<dyn Collection> {
    db.collection("fs.files", CollectionOptions::default())
}

fn chunk_filter(id: FileId, n: u32) -> Document {
    Document::from_iter([("files_id".to_string(), json!(id)), ("n".to_string(), json!(n))])
}

async fn upload(bucket: &Bucket, name: &str, data: &[u8]) -> FileRecord {
    let mut sink = bucket
        .open_upload_sink(name, UploadOptions::default())
        .await
        .unwrap();
    sink.write(data).await.unwrap();
    sink.close().await.unwrap()
}

/// Drain a download, returning the bytes emitted before any terminal error.
async fn drain(bucket: &Bucket, id: FileId) -> (Vec<u8>, Option<BucketError>) {
    let mut source = match bucket.open_download(id).await {
        Ok(source) => source,
        Err(err) => return (Vec::new(), Some(err)),
    };
    let mut bytes = Vec::new();
    while let Some(item) = source.next().await {
        match item {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(err) => return (bytes, Some(err)),
        }
    }
    (bytes, None)
}

async fn stored_chunks(db: &dyn Database, id: FileId) -> Vec<ChunkRecord> {
    let filter = Document::from_iter([("files_id".to_string(), json!(id))]);
    let docs: Vec<Document> = chunks_of(db)
        .find(filter, FindOptions::sorted_by("n"))
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;
    docs.into_iter()
        .map(|doc| from_document(doc).unwrap())
        .collect()
}

#[tokio::test]
async fn round_trip_and_chunk_layout() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    let record = upload(&bucket, "abc.bin", b"ABCDEFGHI").await;

    assert_eq!(record.length, 9);
    assert_eq!(record.chunk_size, 4);
    assert!(record.md5.is_some());

    let chunks = stored_chunks(&db, record.id).await;
    let layout: Vec<(u32, Vec<u8>)> = chunks.into_iter().map(|c| (c.n, c.data)).collect();
    assert_eq!(
        layout,
        vec![
            (0, b"ABCD".to_vec()),
            (1, b"EFGH".to_vec()),
            (2, b"I".to_vec()),
        ]
    );

    let (bytes, err) = drain(&bucket, record.id).await;
    assert!(err.is_none());
    assert_eq!(bytes, b"ABCDEFGHI");
}

#[tokio::test]
async fn exact_multiple_has_no_phantom_chunk() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    let record = upload(&bucket, "even.bin", b"ABCDEFGH").await;

    let chunks = stored_chunks(&db, record.id).await;
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].data.len(), 4);

    let (bytes, err) = drain(&bucket, record.id).await;
    assert!(err.is_none());
    assert_eq!(bytes, b"ABCDEFGH");
}

#[tokio::test]
async fn empty_file_round_trip() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    let record = upload(&bucket, "empty.bin", b"").await;

    assert_eq!(record.length, 0);
    assert!(stored_chunks(&db, record.id).await.is_empty());

    let (bytes, err) = drain(&bucket, record.id).await;
    assert!(err.is_none());
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn empty_file_ignores_stray_chunks() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    let record = upload(&bucket, "empty.bin", b"").await;

    let stray = ChunkRecord {
        id: Uuid::new_v4(),
        files_id: record.id,
        n: 0,
        data: b"junk".to_vec(),
    };
    chunks_of(&db)
        .insert_one(to_document(&stray).unwrap())
        .await
        .unwrap();

    let (bytes, err) = drain(&bucket, record.id).await;
    assert!(err.is_none());
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn write_slicing_is_independent_of_chunk_size() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);

    let mut sink = bucket
        .open_upload_sink("sliced.bin", UploadOptions::default())
        .await
        .unwrap();
    for piece in [&b"A"[..], b"BCD", b"EF", b"GHI"] {
        sink.write(piece).await.unwrap();
    }
    let record = sink.close().await.unwrap();

    let chunks = stored_chunks(&db, record.id).await;
    assert_eq!(
        chunks.iter().map(|c| c.data.len()).collect::<Vec<_>>(),
        vec![4, 4, 1]
    );
    let (bytes, err) = drain(&bucket, record.id).await;
    assert!(err.is_none());
    assert_eq!(bytes, b"ABCDEFGHI");
}

#[tokio::test]
async fn upload_from_stream_round_trip() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);

    let pieces = vec![
        Ok(bytes::Bytes::from_static(b"ABC")),
        Ok(bytes::Bytes::from_static(b"DEFGH")),
        Ok(bytes::Bytes::from_static(b"I")),
    ];
    let record = bucket
        .upload_from_stream(
            "streamed.bin",
            UploadOptions::default(),
            futures::stream::iter(pieces),
        )
        .await
        .unwrap();

    let (bytes, err) = drain(&bucket, record.id).await;
    assert!(err.is_none());
    assert_eq!(bytes, b"ABCDEFGHI");
}

#[tokio::test]
async fn file_record_is_invisible_until_close() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);

    let mut sink = bucket
        .open_upload_sink("pending.bin", UploadOptions::default())
        .await
        .unwrap();
    sink.write(b"ABCDEFGHI").await.unwrap();
    let id = sink.id();

    // Two full chunks are already durable, but no file record yet.
    assert_eq!(stored_chunks(&db, id).await.len(), 2);
    assert!(
        files_of(&db)
            .find_one(&Document::from_iter([("_id".to_string(), json!(id))]))
            .await
            .unwrap()
            .is_none()
    );
    assert!(matches!(
        bucket.open_download(id).await,
        Err(BucketError::FileNotFound(_))
    ));

    let record = sink.close().await.unwrap();
    assert_eq!(record.id, id);
    let (bytes, err) = drain(&bucket, id).await;
    assert!(err.is_none());
    assert_eq!(bytes, b"ABCDEFGHI");
}

#[tokio::test]
async fn missing_chunk_is_detected() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    let record = upload(&bucket, "gap.bin", b"ABCDEFGHI").await;

    assert_eq!(
        chunks_of(&db)
            .delete_one(&chunk_filter(record.id, 1))
            .await
            .unwrap(),
        1
    );

    let (bytes, err) = drain(&bucket, record.id).await;
    assert_eq!(bytes, b"ABCD");
    assert!(matches!(err, Some(BucketError::MissingChunk(1))));
}

#[tokio::test]
async fn truncated_chunk_is_detected() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    let record = upload(&bucket, "short.bin", b"ABCDEFGHI").await;

    let chunks = chunks_of(&db);
    let doc = chunks
        .find_one(&chunk_filter(record.id, 1))
        .await
        .unwrap()
        .unwrap();
    let mut chunk: ChunkRecord = from_document(doc).unwrap();
    chunk.data.truncate(2);
    chunks
        .delete_one(&chunk_filter(record.id, 1))
        .await
        .unwrap();
    chunks.insert_one(to_document(&chunk).unwrap()).await.unwrap();

    let (bytes, err) = drain(&bucket, record.id).await;
    assert_eq!(bytes, b"ABCD");
    assert!(matches!(
        err,
        Some(BucketError::ChunkSizeMismatch {
            n: 1,
            expected: 4,
            actual: 2,
        })
    ));
}

#[tokio::test]
async fn padded_final_chunk_is_detected() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    let record = upload(&bucket, "padded.bin", b"ABCDEFGHI").await;

    let chunks = chunks_of(&db);
    let doc = chunks
        .find_one(&chunk_filter(record.id, 2))
        .await
        .unwrap()
        .unwrap();
    let mut chunk: ChunkRecord = from_document(doc).unwrap();
    chunk.data.extend_from_slice(b"XX");
    chunks
        .delete_one(&chunk_filter(record.id, 2))
        .await
        .unwrap();
    chunks.insert_one(to_document(&chunk).unwrap()).await.unwrap();

    let (_, err) = drain(&bucket, record.id).await;
    assert!(matches!(
        err,
        Some(BucketError::ChunkSizeMismatch {
            n: 2,
            expected: 1,
            actual: 3,
        })
    ));
}

#[tokio::test]
async fn extra_chunk_is_detected_after_the_last_index() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    let record = upload(&bucket, "extra.bin", b"ABCDEFGHI").await;

    let extra = ChunkRecord {
        id: Uuid::new_v4(),
        files_id: record.id,
        n: 3,
        data: b"Z".to_vec(),
    };
    chunks_of(&db)
        .insert_one(to_document(&extra).unwrap())
        .await
        .unwrap();

    let (bytes, err) = drain(&bucket, record.id).await;
    // The full content is emitted before the surplus record is discovered.
    assert_eq!(bytes, b"ABCDEFGHI");
    assert!(matches!(err, Some(BucketError::ExtraChunks { last: 2 })));
}

#[tokio::test]
async fn out_of_order_chunk_is_detected() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    let record = upload(&bucket, "order.bin", b"ABCDEFGHI").await;

    let chunks = chunks_of(&db);
    let doc = chunks
        .find_one(&chunk_filter(record.id, 1))
        .await
        .unwrap()
        .unwrap();
    let mut chunk: ChunkRecord = from_document(doc).unwrap();
    chunk.n = 5;
    chunks
        .delete_one(&chunk_filter(record.id, 1))
        .await
        .unwrap();
    chunks.insert_one(to_document(&chunk).unwrap()).await.unwrap();

    // The ordered scan now yields 0, 2, 5: index 2 arrives where 1 was
    // expected.
    let (bytes, err) = drain(&bucket, record.id).await;
    assert_eq!(bytes, b"ABCD");
    assert!(matches!(
        err,
        Some(BucketError::UnexpectedChunkIndex {
            expected: 1,
            actual: 2,
        })
    ));
}

#[tokio::test]
async fn delete_removes_record_and_chunks() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    let record = upload(&bucket, "gone.bin", b"ABCDEFGHI").await;

    bucket.delete(record.id).await.unwrap();

    assert!(matches!(
        bucket.open_download(record.id).await,
        Err(BucketError::FileNotFound(_))
    ));
    assert!(stored_chunks(&db, record.id).await.is_empty());
    assert!(matches!(
        bucket.delete(record.id).await,
        Err(BucketError::FileNotFound(_))
    ));
}

#[tokio::test]
async fn delete_of_unknown_id_fails() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    assert!(matches!(
        bucket.delete(Uuid::new_v4()).await,
        Err(BucketError::FileNotFound(_))
    ));
}

#[tokio::test]
async fn caller_supplied_id_and_metadata_round_trip() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);

    let id = Uuid::new_v4();
    let metadata = Document::from_iter([("owner".to_string(), json!("tests"))]);
    let record = bucket
        .upload_from_stream(
            "tagged.bin",
            UploadOptions {
                file_id: Some(id),
                metadata: Some(metadata.clone()),
                ..UploadOptions::default()
            },
            futures::stream::iter(vec![Ok(bytes::Bytes::from_static(b"ABCD"))]),
        )
        .await
        .unwrap();

    assert_eq!(record.id, id);
    let source = bucket.open_download(id).await.unwrap();
    assert_eq!(source.file().metadata.as_ref(), Some(&metadata));
}

#[tokio::test]
async fn upload_chunk_size_override() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);

    let record = bucket
        .upload_from_stream(
            "small-chunks.bin",
            UploadOptions {
                chunk_size_bytes: Some(3),
                ..UploadOptions::default()
            },
            futures::stream::iter(vec![Ok(bytes::Bytes::from_static(b"ABCDEFGH"))]),
        )
        .await
        .unwrap();

    assert_eq!(record.chunk_size, 3);
    assert_eq!(stored_chunks(&db, record.id).await.len(), 3);
    let (bytes, err) = drain(&bucket, record.id).await;
    assert!(err.is_none());
    assert_eq!(bytes, b"ABCDEFGH");
}

#[tokio::test]
async fn abort_sweeps_written_chunks() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);

    let mut sink = bucket
        .open_upload_sink("aborted.bin", UploadOptions::default())
        .await
        .unwrap();
    sink.write(b"ABCDEF").await.unwrap();
    let id = sink.id();
    assert_eq!(stored_chunks(&db, id).await.len(), 1);

    sink.abort().await.unwrap();
    assert!(stored_chunks(&db, id).await.is_empty());
    assert!(matches!(
        bucket.open_download(id).await,
        Err(BucketError::FileNotFound(_))
    ));
}

#[tokio::test]
async fn find_filters_file_records() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    upload(&bucket, "a.bin", b"AAAA").await;
    upload(&bucket, "b.bin", b"BBBB").await;

    let filter = Document::from_iter([("filename".to_string(), json!("b.bin"))]);
    let found: Vec<FileRecord> = bucket
        .find(filter, FindOptions::default())
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].filename, "b.bin");
}

#[tokio::test]
async fn drop_removes_everything() {
    let db = MemoryDatabase::new();
    let bucket = bucket_with(&db, 4);
    let record = upload(&bucket, "doomed.bin", b"ABCDEFGHI").await;

    bucket.drop().await.unwrap();

    assert!(matches!(
        bucket.open_download(record.id).await,
        Err(BucketError::FileNotFound(_))
    ));
    assert!(stored_chunks(&db, record.id).await.is_empty());
}

#[tokio::test]
async fn sqlite_backend_round_trip_and_tamper() {
    // A single connection keeps every handle on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let db = SqliteDatabase::new(pool);
    let bucket = bucket_with(&db, 4);

    let record = upload(&bucket, "sql.bin", b"ABCDEFGHI").await;
    let (bytes, err) = drain(&bucket, record.id).await;
    assert!(err.is_none());
    assert_eq!(bytes, b"ABCDEFGHI");

    assert_eq!(
        chunks_of(&db)
            .delete_one(&chunk_filter(record.id, 0))
            .await
            .unwrap(),
        1
    );
    let (bytes, err) = drain(&bucket, record.id).await;
    assert!(bytes.is_empty());
    assert!(matches!(err, Some(BucketError::MissingChunk(0))));

    bucket.delete(record.id).await.unwrap();
    assert!(matches!(
        bucket.open_download(record.id).await,
        Err(BucketError::FileNotFound(_))
    ));
}
