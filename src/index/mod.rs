//! Vector index abstraction.
//!
//! A [`VectorIndex`] is bound to one collection at construction and stores
//! `(id, vector, payload)` records with cosine nearest-neighbour search.
//!
//! | Backend | Type | Notes |
//! |---------|------|-------|
//! | `memory` | [`MemoryIndex`] | in-process, brute force; library and tests only |
//! | `qdrant` | [`QdrantIndex`] | dedicated index over the Qdrant REST API |
//! | `sqlite` | [`SqliteIndex`] | hybrid: FTS5 lexical + stored embeddings |
//!
//! All backends share the same contract:
//! - creating an existing collection with the same dimension is a no-op,
//!   a different dimension is [`Error::CollectionConflict`];
//! - vectors whose length differs from the collection dimension are
//!   rejected with [`Error::DimensionMismatch`];
//! - upserting an existing id replaces its vector and payload entirely.

pub mod memory;
pub mod qdrant;
pub mod sqlite;

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;
pub use sqlite::SqliteIndex;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{IndexBackend, IndexConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::models::{Point, ScoredPoint};

/// Distance function of a collection. Only cosine is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cosine,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
        }
    }
}

/// Shape of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub dims: usize,
    pub metric: Metric,
}

impl CollectionSpec {
    pub fn cosine(name: impl Into<String>, dims: usize) -> Self {
        Self {
            name: name.into(),
            dims,
            metric: Metric::Cosine,
        }
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name used in logs and errors.
    fn backend(&self) -> &'static str;

    /// Name of the collection this index reads and writes.
    fn collection(&self) -> &str;

    /// Create the collection if missing; verify its dimension otherwise.
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()>;

    /// Insert or fully replace points by id.
    async fn upsert(&self, points: &[Point]) -> Result<()>;

    /// Up to `limit` points ordered by descending similarity.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>>;
}

/// Reject a spec addressed to a different collection than the index is bound to.
pub(crate) fn check_spec_name(index: &dyn VectorIndex, spec: &CollectionSpec) -> Result<()> {
    if spec.name != index.collection() {
        return Err(Error::Config(format!(
            "{} index is bound to collection '{}', not '{}'",
            index.backend(),
            index.collection(),
            spec.name
        )));
    }
    Ok(())
}

/// Verify every point against the collection dimension before writing any.
pub(crate) fn check_points(dims: usize, points: &[Point]) -> Result<()> {
    for p in points {
        crate::embedding::check_dims(dims, &p.vector)?;
    }
    Ok(())
}

/// Sort hits by score descending, then id ascending, and keep `limit`.
pub(crate) fn rank(mut hits: Vec<ScoredPoint>, limit: usize) -> Vec<ScoredPoint> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    hits.truncate(limit);
    hits
}

/// Open the dedicated index selected by `index.backend`.
///
/// For `sqlite` this returns the hybrid index through its plain vector
/// interface; use [`SqliteIndex::open`] directly for hybrid search.
pub async fn open_index(
    config: &IndexConfig,
    retrieval: &RetrievalConfig,
) -> Result<Arc<dyn VectorIndex>> {
    match config.backend {
        IndexBackend::Memory => Ok(Arc::new(MemoryIndex::new(&config.collection))),
        IndexBackend::Qdrant => Ok(Arc::new(QdrantIndex::new(config)?)),
        IndexBackend::Sqlite => Ok(Arc::new(
            SqliteIndex::open(&config.path, &config.collection, retrieval).await?,
        )),
    }
}
