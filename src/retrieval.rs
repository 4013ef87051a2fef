//! Uniform retrieval contract over every index backend.
//!
//! The answering component only ever sees a [`KnowledgeSource`]. Two
//! adapters implement it:
//!
//! - [`VectorAdapter`] embeds the query and runs a nearest-neighbour search
//!   on any [`VectorIndex`]; scores are cosine similarities.
//! - [`HybridAdapter`] embeds the query and hands both the raw text and the
//!   vector to [`SqliteIndex::hybrid_search`]; scores are blended `[0, 1]`.
//!
//! Both clamp `max_results <= 0` to the configured default, return an empty
//! list for an empty query, and accept no filters.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::{Config, IndexBackend};
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::Result;
use crate::index::{open_index, SqliteIndex, VectorIndex};
use crate::models::RetrievedDocument;

#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Ranked documents for `query`, best first.
    async fn search(&self, query: &str, max_results: i64) -> Result<Vec<RetrievedDocument>>;

    /// Normalize caller-supplied filters. Returns the filters to apply and
    /// any warnings about ignored keys.
    fn validate_filters(&self, filters: Option<&Value>) -> (Option<Value>, Vec<String>);
}

/// `max_results <= 0` means "use the default".
pub fn effective_limit(max_results: i64, default: usize) -> usize {
    if max_results <= 0 {
        default
    } else {
        max_results as usize
    }
}

pub struct VectorAdapter {
    index: Arc<dyn VectorIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    default_max_results: usize,
}

impl VectorAdapter {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        provider: Arc<dyn EmbeddingProvider>,
        default_max_results: usize,
    ) -> Self {
        Self {
            index,
            provider,
            default_max_results,
        }
    }
}

#[async_trait]
impl KnowledgeSource for VectorAdapter {
    async fn search(&self, query: &str, max_results: i64) -> Result<Vec<RetrievedDocument>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let limit = effective_limit(max_results, self.default_max_results);
        let vector = embed_query(self.provider.as_ref(), query).await?;
        let hits = self.index.search(&vector, limit).await?;
        debug!(backend = self.index.backend(), hits = hits.len(), "vector search");

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedDocument::from_payload(hit.payload, Some(hit.score)))
            .collect())
    }

    fn validate_filters(&self, _filters: Option<&Value>) -> (Option<Value>, Vec<String>) {
        (None, Vec::new())
    }
}

pub struct HybridAdapter {
    index: Arc<SqliteIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    default_max_results: usize,
}

impl HybridAdapter {
    pub fn new(
        index: Arc<SqliteIndex>,
        provider: Arc<dyn EmbeddingProvider>,
        default_max_results: usize,
    ) -> Self {
        Self {
            index,
            provider,
            default_max_results,
        }
    }
}

#[async_trait]
impl KnowledgeSource for HybridAdapter {
    async fn search(&self, query: &str, max_results: i64) -> Result<Vec<RetrievedDocument>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let limit = effective_limit(max_results, self.default_max_results);
        let vector = embed_query(self.provider.as_ref(), query).await?;
        let hits = self.index.hybrid_search(query, &vector, limit).await?;
        debug!(hits = hits.len(), "hybrid search");

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedDocument::from_payload(hit.payload, Some(hit.score)))
            .collect())
    }

    fn validate_filters(&self, _filters: Option<&Value>) -> (Option<Value>, Vec<String>) {
        (None, Vec::new())
    }
}

/// Build the adapter matching `index.backend`: hybrid for `sqlite`, plain
/// vector search for the dedicated backends.
pub async fn build_knowledge_source(
    config: &Config,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<dyn KnowledgeSource>> {
    let default = config.retrieval.default_max_results;
    match config.index.backend {
        IndexBackend::Sqlite => {
            let index = SqliteIndex::open(
                &config.index.path,
                &config.index.collection,
                &config.retrieval,
            )
            .await?;
            Ok(Arc::new(HybridAdapter::new(Arc::new(index), provider, default)))
        }
        IndexBackend::Memory | IndexBackend::Qdrant => {
            let index = open_index(&config.index, &config.retrieval).await?;
            Ok(Arc::new(VectorAdapter::new(index, provider, default)))
        }
    }
}

/// CLI entry point for `medrag query`.
pub async fn run_query(config: &Config, query: &str, limit: Option<i64>) -> Result<()> {
    let provider = crate::embedding::create_provider(&config.embedding)?;
    let source = build_knowledge_source(config, provider).await?;
    let results = source.search(query, limit.unwrap_or(0)).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let disease = result
            .metadata
            .get("disease")
            .and_then(Value::as_str)
            .unwrap_or("(unknown)");
        let source_file = result
            .metadata
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("");
        println!(
            "{}. [{:.2}] {}",
            i + 1,
            result.score.unwrap_or_default(),
            disease
        );
        println!("    source: {}", source_file);
        if let Some(row_id) = result.metadata.get("row_id") {
            println!("    row: {}", row_id);
        }
        println!(
            "    excerpt: \"{}\"",
            excerpt(&result.content, 160).replace('\n', " ").trim()
        );
        println!();
    }
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
