//! Postgres + pgvector backend.
//!
//! Records live in one table keyed by id. A `chatId` filter goes to the
//! indexed `chat_id` column; any other equality filters are expressed as
//! JSONB containment (`metadata @> $filter`). Score = 1 - cosine distance.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;

use super::{check_dimensions, IndexError, IndexedRecord, Metadata, QueryMatch, QueryRequest, VectorIndex};

pub struct PgVectorIndex {
    pool: PgPool,
    table: String,
    dimensions: usize,
}

impl PgVectorIndex {
    pub fn new(pool: PgPool, table: &str, dimensions: usize) -> Result<Self, IndexError> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(IndexError::Config(format!("Invalid table name: {:?}", table)));
        }
        Ok(Self {
            pool,
            table: table.to_string(),
            dimensions,
        })
    }

    /// Create the table and its ANN index if missing.
    pub async fn ensure_schema(&self) -> Result<(), IndexError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                chat_id TEXT,
                embedding vector({dims}) NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            table = self.table,
            dims = self.dimensions
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_chat_id_idx ON {table} (chat_id)",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_embedding_idx ON {table} USING hnsw (embedding vector_cosine_ops)",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        tracing::info!(table = %self.table, dimensions = self.dimensions, "pgvector schema ready");
        Ok(())
    }
}

/// Pull a text `chatId` out of `filter`; the remainder is matched by containment.
fn split_filter(filter: &Metadata) -> (Option<String>, Metadata) {
    let mut rest = filter.clone();
    let chat_id = rest.get("chatId").and_then(|v| v.as_str()).map(str::to_string);
    if chat_id.is_some() {
        rest.remove("chatId");
    }
    (chat_id, rest)
}

/// Nearest-neighbour query. Ordering is by distance alone so the HNSW index
/// can serve it.
fn query_sql(table: &str, by_chat: bool) -> String {
    let chat_clause = if by_chat { "chat_id = $4 AND " } else { "" };
    format!(
        "SELECT id, 1 - (embedding <=> $1::vector) AS score, metadata \
         FROM {table} \
         WHERE {chat_clause}metadata @> $2 \
         ORDER BY embedding <=> $1::vector \
         LIMIT $3",
        table = table,
        chat_clause = chat_clause
    )
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<(), IndexError> {
        let vectors: Vec<&[f32]> = records.iter().map(|r| r.values.as_slice()).collect();
        check_dimensions(self.dimensions, &vectors)?;

        let sql = format!(
            r#"
            INSERT INTO {} (id, chat_id, embedding, metadata)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET chat_id = EXCLUDED.chat_id,
                embedding = EXCLUDED.embedding,
                metadata = EXCLUDED.metadata
            "#,
            self.table
        );

        let mut tx = self.pool.begin().await?;
        for record in records {
            let chat_id = record
                .metadata
                .get("chatId")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let metadata = serde_json::to_value(&record.metadata)?;

            sqlx::query(&sql)
                .bind(&record.id)
                .bind(chat_id)
                .bind(Vector::from(record.values))
                .bind(metadata)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, IndexError> {
        check_dimensions(self.dimensions, &[&request.vector])?;

        let (chat_id, rest) = split_filter(&request.filter);
        let sql = query_sql(&self.table, chat_id.is_some());

        let rest = serde_json::to_value(&rest)?;
        let mut query = sqlx::query_as::<_, (String, Option<f64>, serde_json::Value)>(&sql)
            .bind(Vector::from(request.vector))
            .bind(rest)
            .bind(request.top_k as i64);
        if let Some(chat_id) = chat_id {
            query = query.bind(chat_id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|(id, score, metadata)| -> Result<QueryMatch, IndexError> {
                let metadata = if request.include_metadata {
                    Some(serde_json::from_value::<Metadata>(metadata)?)
                } else {
                    None
                };
                Ok(QueryMatch {
                    id,
                    // NaN distance (zero-norm query) scores 0
                    score: score.filter(|s| s.is_finite()).unwrap_or(0.0) as f32,
                    metadata,
                })
            })
            .collect()
    }

    async fn delete_many(&self, ids: &[String]) -> Result<(), IndexError> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", self.table))
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "pgvector"
    }
}
