//! Hybrid relational index on SQLite.
//!
//! Records live in the `records` table with their embedding stored as a
//! little-endian f32 BLOB; their text is mirrored into the `records_fts`
//! FTS5 table for BM25 keyword search. Vector search is brute-force cosine
//! similarity in Rust over every record of the collection.
//!
//! [`SqliteIndex::hybrid_search`] runs both channels, min-max normalizes
//! each, and blends them with `retrieval.hybrid_alpha`:
//!
//! ```text
//! hybrid = (1 - alpha) * keyword + alpha * vector
//! ```
//!
//! Ids are `u64` in the API and stored bit-for-bit as SQLite `INTEGER`.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::{check_points, check_spec_name, rank, CollectionSpec, VectorIndex};
use crate::config::RetrievalConfig;
use crate::db;
use crate::embedding::{blob_to_vec, check_dims, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{Point, ScoredPoint, CONTENT_KEY};
use crate::search::{blend, Candidate};

pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
    alpha: f64,
    candidate_k: usize,
}

fn to_sql_id(id: u64) -> i64 {
    id as i64
}

fn from_sql_id(id: i64) -> u64 {
    id as u64
}

impl SqliteIndex {
    /// Open (creating if needed) the database file and its tables.
    pub async fn open(path: &Path, collection: &str, retrieval: &RetrievalConfig) -> Result<Self> {
        let pool = db::connect(path).await?;
        Self::from_pool(pool, collection, retrieval).await
    }

    /// A throwaway in-memory database.
    pub async fn in_memory(collection: &str, retrieval: &RetrievalConfig) -> Result<Self> {
        let pool = db::connect_in_memory().await?;
        Self::from_pool(pool, collection, retrieval).await
    }

    async fn from_pool(
        pool: SqlitePool,
        collection: &str,
        retrieval: &RetrievalConfig,
    ) -> Result<Self> {
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            collection: collection.to_string(),
            alpha: retrieval.hybrid_alpha,
            candidate_k: retrieval.candidate_k,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn dims(&self) -> Result<usize> {
        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM collections WHERE name = ?")
            .bind(&self.collection)
            .fetch_optional(&self.pool)
            .await?;
        dims.map(|d| d as usize).ok_or_else(|| {
            Error::backend(
                "sqlite",
                format!("collection '{}' does not exist", self.collection),
            )
        })
    }

    /// Number of records in the collection.
    pub async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    /// Store one record under the next free id and return that id.
    pub async fn add(
        &self,
        content: &str,
        metadata: Map<String, Value>,
        vector: &[f32],
    ) -> Result<u64> {
        check_dims(self.dims().await?, vector)?;
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(id) + 1, 0) FROM records WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_one(&self.pool)
        .await?;

        let mut payload = metadata;
        payload.insert(CONTENT_KEY.to_string(), Value::String(content.to_string()));
        let id = from_sql_id(next);
        self.upsert(&[Point {
            id,
            vector: vector.to_vec(),
            payload,
        }])
        .await?;
        Ok(id)
    }

    /// Blend BM25 keyword matches for `query_text` with cosine matches for
    /// `vector`. Scores are in `[0, 1]`.
    pub async fn hybrid_search(
        &self,
        query_text: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        check_dims(self.dims().await?, vector)?;
        let candidate_k = self.candidate_k.max(limit);

        let keyword = self.keyword_candidates(query_text, candidate_k).await?;
        let mut vector_hits = self.vector_candidates(vector).await?;
        vector_hits.truncate(candidate_k);
        let vector_candidates: Vec<Candidate> = vector_hits
            .iter()
            .map(|(id, score)| Candidate {
                id: *id,
                raw_score: *score,
            })
            .collect();

        debug!(
            keyword = keyword.len(),
            vector = vector_candidates.len(),
            "hybrid candidates"
        );

        let mut hits = Vec::new();
        for (id, score) in blend(&keyword, &vector_candidates, self.alpha, limit) {
            hits.push(ScoredPoint {
                id,
                score,
                payload: self.fetch_payload(id).await?,
            });
        }
        Ok(hits)
    }

    async fn keyword_candidates(&self, query_text: &str, limit: usize) -> Result<Vec<Candidate>> {
        let Some(fts_query) = fts_query(query_text) else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(
            r#"
            SELECT record_id, rank
            FROM records_fts
            WHERE records_fts MATCH ? AND collection = ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(fts_query)
        .bind(&self.collection)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                Candidate {
                    id: from_sql_id(row.get("record_id")),
                    raw_score: -rank, // negate so higher = better
                }
            })
            .collect())
    }

    /// Every record's cosine similarity to `vector`, best first.
    async fn vector_candidates(&self, vector: &[f32]) -> Result<Vec<(u64, f64)>> {
        let rows = sqlx::query("SELECT id, embedding FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_all(&self.pool)
            .await?;

        let mut scored: Vec<(u64, f64)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(vector, &blob_to_vec(&blob)) as f64;
                (from_sql_id(row.get("id")), similarity)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        Ok(scored)
    }

    async fn fetch_payload(&self, id: u64) -> Result<Option<Map<String, Value>>> {
        let row = sqlx::query(
            "SELECT content, payload_json FROM records WHERE collection = ? AND id = ?",
        )
        .bind(&self.collection)
        .bind(to_sql_id(id))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload_json: String = row.get("payload_json");
        let mut payload = match serde_json::from_str(&payload_json)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let content: String = row.get("content");
        payload.insert(CONTENT_KEY.to_string(), Value::String(content));
        Ok(Some(payload))
    }
}

/// Quote each alphanumeric token and OR them together, so user text can
/// never be parsed as FTS5 syntax. `None` when the text has no tokens.
fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Split a payload into its text and the JSON of the remaining fields.
fn split_payload(payload: &Map<String, Value>) -> Result<(String, String)> {
    let mut rest = payload.clone();
    let content = match rest.remove(CONTENT_KEY) {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    Ok((content, serde_json::to_string(&rest)?))
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()> {
        check_spec_name(self, spec)?;
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM collections WHERE name = ?")
                .bind(&spec.name)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            Some(d) if d as usize != spec.dims => Err(Error::CollectionConflict {
                name: spec.name.clone(),
                existing: d as usize,
                requested: spec.dims,
            }),
            Some(_) => Ok(()),
            None => {
                sqlx::query("INSERT INTO collections (name, dims, metric) VALUES (?, ?, ?)")
                    .bind(&spec.name)
                    .bind(spec.dims as i64)
                    .bind(spec.metric.as_str())
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
        }
    }

    async fn upsert(&self, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        check_points(self.dims().await?, points)?;

        let mut tx = self.pool.begin().await?;
        for p in points {
            let (content, payload_json) = split_payload(&p.payload)?;
            let id = to_sql_id(p.id);

            sqlx::query(
                r#"
                INSERT INTO records (collection, id, content, payload_json, embedding)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    content = excluded.content,
                    payload_json = excluded.payload_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&self.collection)
            .bind(id)
            .bind(&content)
            .bind(&payload_json)
            .bind(vec_to_blob(&p.vector))
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM records_fts WHERE collection = ? AND record_id = ?")
                .bind(&self.collection)
                .bind(id)
                .execute(&mut *tx)
                .await?;

            sqlx::query("INSERT INTO records_fts (collection, record_id, content) VALUES (?, ?, ?)")
                .bind(&self.collection)
                .bind(id)
                .bind(&content)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        check_dims(self.dims().await?, vector)?;
        let mut hits = Vec::new();
        for (id, score) in self.vector_candidates(vector).await?.into_iter().take(limit) {
            hits.push(ScoredPoint {
                id,
                score,
                payload: self.fetch_payload(id).await?,
            });
        }
        Ok(rank(hits, limit))
    }
}
