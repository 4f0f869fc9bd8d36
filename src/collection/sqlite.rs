//! SQLite collection backend.
//!
//! One table per collection, holding the JSON text of each document in a
//! single `doc` column. Equality filters and sort keys compile to
//! `json_extract` expressions; `create_index` emits expression indexes so the
//! ordered chunk scan stays cheap.

use super::{
    Collection, CollectionOptions, CollectionResult, Database, Document, DocumentStream,
    FindOptions, SortOrder,
};
use async_trait::async_trait;
use futures::stream;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// SQLite-backed database handing out one [`SqliteCollection`] per name.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url`, creating the database file when missing.
    pub async fn connect(url: &str) -> CollectionResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(anyhow::Error::from)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(Self::new(pool))
    }
}

impl Database for SqliteDatabase {
    fn collection(&self, name: &str, _options: CollectionOptions) -> Arc<dyn Collection> {
        Arc::new(SqliteCollection {
            pool: self.pool.clone(),
            table: sanitize_name(name),
        })
    }
}

pub struct SqliteCollection {
    pool: SqlitePool,
    table: String,
}

impl SqliteCollection {
    fn quoted_table(&self) -> String {
        format!("\"{}\"", self.table)
    }

    async fn ensure_table(&self) -> CollectionResult<()> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (doc TEXT NOT NULL)",
            self.quoted_table()
        ))
        .execute(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(())
    }

    /// Append `AND json_extract(doc, '$.field') = json_extract(?, '$')` terms
    /// for every filter field.
    fn push_filter(
        builder: &mut QueryBuilder<'_, Sqlite>,
        filter: &Document,
    ) -> CollectionResult<()> {
        for (field, value) in filter {
            let path = json_path(field)?;
            builder.push(format!(" AND json_extract(doc, '{path}') = json_extract("));
            builder.push_bind(serde_json::to_string(value)?);
            builder.push(", '$')");
        }
        Ok(())
    }
}

#[async_trait]
impl Collection for SqliteCollection {
    async fn insert_one(&self, doc: Document) -> CollectionResult<()> {
        self.ensure_table().await?;
        let text = serde_json::to_string(&serde_json::Value::Object(doc))?;
        sqlx::query(&format!(
            "INSERT INTO {} (doc) VALUES (?)",
            self.quoted_table()
        ))
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn delete_one(&self, filter: &Document) -> CollectionResult<u64> {
        self.ensure_table().await?;
        let table = self.quoted_table();
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "DELETE FROM {table} WHERE rowid IN (SELECT rowid FROM {table} WHERE 1=1"
        ));
        Self::push_filter(&mut builder, filter)?;
        builder.push(" LIMIT 1)");
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(result.rows_affected())
    }

    async fn delete_many(&self, filter: &Document) -> CollectionResult<u64> {
        self.ensure_table().await?;
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("DELETE FROM {} WHERE 1=1", self.quoted_table()));
        Self::push_filter(&mut builder, filter)?;
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(result.rows_affected())
    }

    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> CollectionResult<DocumentStream> {
        self.ensure_table().await?;
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT doc FROM {} WHERE 1=1", self.quoted_table()));
        Self::push_filter(&mut builder, &filter)?;
        if !options.sort.is_empty() {
            builder.push(" ORDER BY ");
            for (i, (field, order)) in options.sort.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                let path = json_path(field)?;
                let direction = match order {
                    SortOrder::Ascending => "ASC",
                    SortOrder::Descending => "DESC",
                };
                builder.push(format!("json_extract(doc, '{path}') {direction}"));
            }
        }
        if let Some(limit) = options.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        let docs = rows
            .into_iter()
            .map(|row| {
                let text: String = row.try_get(0).map_err(anyhow::Error::from)?;
                Ok(serde_json::from_str::<Document>(&text)?)
            })
            .collect::<Vec<CollectionResult<Document>>>();
        Ok(Box::pin(stream::iter(docs)))
    }

    async fn find_one(&self, filter: &Document) -> CollectionResult<Option<Document>> {
        self.ensure_table().await?;
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT doc FROM {} WHERE 1=1", self.quoted_table()));
        Self::push_filter(&mut builder, filter)?;
        builder.push(" LIMIT 1");
        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        match row {
            Some(row) => {
                let text: String = row.try_get(0).map_err(anyhow::Error::from)?;
                Ok(Some(serde_json::from_str(&text)?))
            }
            None => Ok(None),
        }
    }

    async fn drop(&self) -> CollectionResult<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.quoted_table()))
            .execute(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        debug!(table = %self.table, "dropped collection table");
        Ok(())
    }

    async fn create_index(&self, keys: &[(&str, SortOrder)]) -> CollectionResult<()> {
        self.ensure_table().await?;
        let mut name = format!("idx_{}", self.table.replace('.', "_"));
        let mut columns = Vec::with_capacity(keys.len());
        for (field, order) in keys {
            let path = json_path(field)?;
            let direction = match order {
                SortOrder::Ascending => "ASC",
                SortOrder::Descending => "DESC",
            };
            name.push('_');
            name.push_str(field);
            columns.push(format!("json_extract(doc, '{path}') {direction}"));
        }
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS \"{name}\" ON {} ({})",
            self.quoted_table(),
            columns.join(", ")
        ))
        .execute(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(())
    }
}

/// Collection names become table names; keep them to a safe character set.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Build a `$.field` JSON path, rejecting fields that could escape the quoted
/// literal.
fn json_path(field: &str) -> CollectionResult<String> {
    if field.is_empty()
        || !field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(super::CollectionError::Malformed(format!(
            "unsupported field name `{field}`"
        )));
    }
    Ok(format!("$.{field}"))
}
