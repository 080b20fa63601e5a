//! Postgres pool helpers for the pgvector index backend.

use serde::Serialize;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::DatabaseConfig;
use crate::error::ChatragError;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, ChatragError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    Ok(pool)
}

#[derive(Debug, Clone, Serialize)]
pub struct DbHealth {
    pub postgresql: String,
    /// `None` when the `vector` extension is not installed.
    pub pgvector: Option<String>,
}

/// Server and extension versions; errors only when the database is unreachable.
pub async fn check_health(pool: &PgPool) -> Result<DbHealth, ChatragError> {
    let (postgresql,): (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    let pgvector: Option<(String,)> =
        sqlx::query_as("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
            .fetch_optional(pool)
            .await?;

    Ok(DbHealth {
        postgresql,
        pgvector: pgvector.map(|(v,)| v),
    })
}
