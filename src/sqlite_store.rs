//! SQLite-backed [`Store`] implementation.
//!
//! The whole index is one SQLite file: chunk rows with their provenance,
//! one little-endian `f32` BLOB per chunk, and a small key/value table
//! recording which embedding model built the index. Similarity search is
//! brute-force cosine similarity over every stored vector.
//!
//! The file is created lazily on the first non-empty insert. Read paths
//! against a path that does not exist yet report an empty index and leave
//! the filesystem untouched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tokio::sync::OnceCell;

use medinteract_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use medinteract_core::models::Chunk;
use medinteract_core::store::{sort_by_score, IndexEntry, ScoredEntry, Store};

use crate::{db, migrate};

const META_MODEL: &str = "embedding_model";
const META_DIMS: &str = "embedding_dims";
const META_CREATED_AT: &str = "created_at";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    path: PathBuf,
    pool: OnceCell<SqlitePool>,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connect (creating the file and schema if needed).
    async fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                let pool = db::connect(&self.path)
                    .await
                    .with_context(|| format!("Failed to open index at {}", self.path.display()))?;
                migrate::run_migrations(&pool).await?;
                Ok::<_, anyhow::Error>(pool)
            })
            .await
    }

    /// Connect only if the index file already exists.
    async fn existing_pool(&self) -> Result<Option<&SqlitePool>> {
        if self.pool.initialized() || self.path.exists() {
            return self.pool().await.map(Some);
        }
        Ok(None)
    }

    async fn meta(&self, key: &str) -> Result<Option<String>> {
        let Some(pool) = self.existing_pool().await? else {
            return Ok(None);
        };
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
        Ok(value)
    }

    /// RFC 3339 timestamp of the first insert, if the index exists.
    pub async fn created_at(&self) -> Result<Option<String>> {
        self.meta(META_CREATED_AT).await
    }

    /// Number of distinct source files in the index.
    pub async fn source_count(&self) -> Result<usize> {
        let Some(pool) = self.existing_pool().await? else {
            return Ok(0);
        };
        let n: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM chunks")
            .fetch_one(pool)
            .await?;
        Ok(n as usize)
    }

    /// Close the connection pool, if one was opened.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn count(&self) -> Result<usize> {
        let Some(pool) = self.existing_pool().await? else {
            return Ok(0);
        };
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(pool)
            .await?;
        Ok(n as usize)
    }

    async fn embedding_model(&self) -> Result<Option<String>> {
        self.meta(META_MODEL).await
    }

    async fn existing_hashes(&self, hashes: &[String]) -> Result<HashSet<String>> {
        let Some(pool) = self.existing_pool().await? else {
            return Ok(HashSet::new());
        };
        let rows = sqlx::query("SELECT hash FROM chunks").fetch_all(pool).await?;
        let known: HashSet<String> = rows.iter().map(|row| row.get("hash")).collect();
        Ok(hashes.iter().filter(|h| known.contains(*h)).cloned().collect())
    }

    async fn insert(&self, entries: &[IndexEntry], model: &str) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        let dims = entries[0].vector.len().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        for (key, value) in [(META_MODEL, model), (META_DIMS, dims.as_str()), (META_CREATED_AT, now.as_str())] {
            sqlx::query("INSERT OR IGNORE INTO index_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        let mut inserted = 0;
        for entry in entries {
            let chunk = &entry.chunk;
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO chunks (id, source, page, chunk_index, text, hash)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.page as i64)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                continue;
            }

            sqlx::query("INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)")
                .bind(&chunk.id)
                .bind(vec_to_blob(&entry.vector))
                .execute(&mut *tx)
                .await?;
            inserted += 1;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn flush(&self) -> Result<()> {
        if let Some(pool) = self.pool.get() {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                .execute(pool)
                .await?;
        }
        Ok(())
    }

    async fn similarity_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredEntry>> {
        let Some(pool) = self.existing_pool().await? else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.source, c.page, c.chunk_index, c.text, c.hash, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut scored: Vec<ScoredEntry> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let page: i64 = row.get("page");
                ScoredEntry {
                    score: cosine_similarity(query_vec, &vector) as f64,
                    chunk: Chunk {
                        id: row.get("id"),
                        source: row.get("source"),
                        page: page as u32,
                        chunk_index: row.get("chunk_index"),
                        text: row.get("text"),
                        hash: row.get("hash"),
                    },
                    vector,
                }
            })
            .collect();

        sort_by_score(&mut scored);
        scored.truncate(limit);
        Ok(scored)
    }
}
