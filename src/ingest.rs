//! Ingestion pipeline orchestration.
//!
//! Two stages, each runnable on its own from the CLI:
//!
//! 1. **documents**: discover CSV sources → detect table roles → build one
//!    document per symptom row → write the intermediate JSONL file.
//! 2. **ingest**: read the JSONL file → assign ids → embed in fixed-size
//!    batches → upsert each batch into the vector index.
//!
//! Ingestion is single-pass and sequential. A failed batch stops the run;
//! batches already written stay written, and the failing id range is logged
//! so the run can be resumed or repeated (upserts are idempotent by id).

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{error, info};

use crate::builder::{build_documents, PrecautionMap};
use crate::config::{Config, IdScheme};
use crate::embedding::{self, embed_texts, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::index::{open_index, CollectionSpec, VectorIndex};
use crate::jsonl::{load_documents, save_documents, DocumentRecord};
use crate::models::{Document, Point};
use crate::schema::detect_files;
use crate::table::discover_csv_files;

/// Summary of one ingest run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub points: usize,
    pub batches: usize,
}

/// Discover, detect and build documents from every CSV file in `data_dir`.
pub fn build_from_dir(data_dir: &Path) -> Result<Vec<Document>> {
    let files = discover_csv_files(data_dir)?;
    info!(dir = %data_dir.display(), files = files.len(), "discovered csv files");

    let detected = detect_files(&files)?;
    let precautions = detected
        .precaution
        .as_ref()
        .map(PrecautionMap::from_table)
        .unwrap_or_default();
    let docs = build_documents(&detected.symptom, &precautions);
    info!(
        documents = docs.len(),
        precaution_entries = precautions.len(),
        "built documents"
    );
    Ok(docs)
}

/// Id for a record under the given scheme. `position` is the record's index
/// within the run.
pub fn assign_id(record: &DocumentRecord, position: usize, scheme: IdScheme) -> u64 {
    match scheme {
        IdScheme::Position => position as u64,
        IdScheme::ContentHash => content_hash_id(
            &record.metadata.source,
            &record.metadata.disease,
            &record.page_content,
        ),
    }
}

/// First 8 bytes (big-endian) of SHA-256 over source, disease and content.
pub fn content_hash_id(source: &str, disease: &str, content: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(disease.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Embeds documents and writes them to one index.
pub struct Ingestor {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    id_scheme: IdScheme,
}

impl Ingestor {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        batch_size: usize,
        id_scheme: IdScheme,
    ) -> Self {
        Self {
            provider,
            index,
            batch_size: batch_size.max(1),
            id_scheme,
        }
    }

    /// Create the collection sized for the provider, or verify the existing one.
    pub async fn init(&self) -> Result<()> {
        let spec = CollectionSpec::cosine(self.index.collection(), self.provider.dims());
        self.index.ensure_collection(&spec).await
    }

    pub async fn ingest(&self, records: &[DocumentRecord]) -> Result<IngestReport> {
        self.init().await?;

        let mut report = IngestReport {
            points: 0,
            batches: 0,
        };

        for (batch_no, batch) in records.chunks(self.batch_size).enumerate() {
            let offset = batch_no * self.batch_size;
            let ids: Vec<u64> = batch
                .iter()
                .enumerate()
                .map(|(i, r)| assign_id(r, offset + i, self.id_scheme))
                .collect();
            let positions = offset..offset + batch.len();
            let first_id = ids.first().copied().unwrap_or_default();
            let last_id = ids.last().copied().unwrap_or_default();

            let texts: Vec<String> = batch.iter().map(|r| r.page_content.clone()).collect();
            let vectors = match embed_texts(self.provider.as_ref(), &texts).await {
                Ok(v) => v,
                Err(e) => {
                    error!(
                        positions = ?positions,
                        first_id,
                        last_id,
                        error = %e,
                        "embedding failed for batch"
                    );
                    return Err(e);
                }
            };

            let points: Vec<Point> = batch
                .iter()
                .zip(ids)
                .zip(vectors)
                .map(|((record, id), vector)| Point {
                    id,
                    vector,
                    payload: record.payload(),
                })
                .collect();

            if let Err(e) = self.index.upsert(&points).await {
                error!(
                    backend = self.index.backend(),
                    positions = ?positions,
                    first_id,
                    last_id,
                    error = %e,
                    "upsert failed for batch"
                );
                return Err(Error::BatchUpsert {
                    positions,
                    first_id,
                    last_id,
                    source: Box::new(e),
                });
            }

            report.points += points.len();
            report.batches += 1;
            info!(
                batch = batch_no + 1,
                points = report.points,
                total = records.len(),
                "upserted batch"
            );
        }

        Ok(report)
    }
}

// ============ CLI entry points ============

pub async fn run_documents(
    config: &Config,
    data_dir: Option<&Path>,
    out: Option<&Path>,
) -> Result<()> {
    let data_dir = data_dir.unwrap_or(config.data.dir.as_path());
    let out = out.unwrap_or(config.data.documents.as_path());

    let docs = build_from_dir(data_dir)?;
    save_documents(&docs, out)?;

    println!("documents");
    println!("  source dir: {}", data_dir.display());
    println!("  documents written: {}", docs.len());
    println!("  output: {}", out.display());
    if let Some(first) = docs.first() {
        println!();
        println!("sample (row {}):", first.metadata.row_id);
        println!("{}", first.content);
    }
    Ok(())
}

fn require_embeddings(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    if !config.embedding.is_enabled() {
        return Err(Error::Config(
            "embedding provider is disabled; set [embedding] provider in config".to_string(),
        ));
    }
    embedding::create_provider(&config.embedding)
}

pub async fn run_init(config: &Config) -> Result<()> {
    let provider = require_embeddings(config)?;
    let index = open_index(&config.index, &config.retrieval).await?;
    Ingestor::new(
        provider.clone(),
        index.clone(),
        config.index.batch_size,
        config.index.id_scheme,
    )
    .init()
    .await?;

    println!("init");
    println!("  backend: {}", index.backend());
    println!("  collection: {}", index.collection());
    println!("  dims: {}", provider.dims());
    println!("ok");
    Ok(())
}

pub async fn run_ingest(
    config: &Config,
    documents: Option<&Path>,
    batch_size_override: Option<usize>,
) -> Result<()> {
    let path = documents.unwrap_or(config.data.documents.as_path());
    let batch_size = batch_size_override.unwrap_or(config.index.batch_size);
    if batch_size == 0 {
        return Err(Error::Config("batch size must be > 0".to_string()));
    }

    let records = load_documents(path)?;
    let provider = require_embeddings(config)?;
    let index = open_index(&config.index, &config.retrieval).await?;
    let ingestor = Ingestor::new(provider, index.clone(), batch_size, config.index.id_scheme);
    let report = ingestor.ingest(&records).await?;

    println!("ingest");
    println!("  documents: {}", records.len());
    println!("  batches: {}", report.batches);
    println!("  points upserted: {}", report.points);
    println!("  collection: {} ({})", index.collection(), index.backend());
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;
    use crate::index::MemoryIndex;
    use crate::models::DocumentMetadata;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(disease: &str, row_id: usize) -> DocumentRecord {
        DocumentRecord {
            page_content: format!("# Disease: {}", disease),
            metadata: DocumentMetadata {
                disease: disease.to_string(),
                symptom_count: 0,
                precaution_count: 0,
                source: "s.csv".to_string(),
                row_id,
            },
        }
    }

    #[test]
    fn test_content_hash_independent_of_position() {
        let r = record("Flu", 0);
        assert_eq!(
            assign_id(&r, 0, IdScheme::ContentHash),
            assign_id(&r, 9, IdScheme::ContentHash)
        );
        assert_ne!(
            assign_id(&r, 0, IdScheme::ContentHash),
            assign_id(&record("Cold", 0), 0, IdScheme::ContentHash)
        );
        assert_eq!(assign_id(&r, 9, IdScheme::Position), 9);
    }

    #[tokio::test]
    async fn test_ingest_batches_with_positional_ids() {
        let index = Arc::new(MemoryIndex::new("c"));
        let ingestor = Ingestor::new(
            Arc::new(HashProvider::new(16)),
            index.clone(),
            2,
            IdScheme::Position,
        );
        let records: Vec<_> = ["A", "B", "C"]
            .iter()
            .enumerate()
            .map(|(i, d)| record(d, i))
            .collect();

        let report = ingestor.ingest(&records).await.unwrap();
        assert_eq!(report, IngestReport { points: 3, batches: 2 });
        assert_eq!(index.len(), 3);

        // re-ingest overwrites by id
        ingestor.ingest(&records).await.unwrap();
        assert_eq!(index.len(), 3);
    }

    /// Accepts the first `ok_batches` upserts, then fails.
    struct FlakyIndex {
        inner: MemoryIndex,
        ok_batches: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        fn backend(&self) -> &'static str {
            "flaky"
        }
        fn collection(&self) -> &str {
            self.inner.collection()
        }
        async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()> {
            self.inner.ensure_collection(spec).await
        }
        async fn upsert(&self, points: &[Point]) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_batches {
                return Err(Error::backend("flaky", "503 service unavailable"));
            }
            self.inner.upsert(points).await
        }
        async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<crate::models::ScoredPoint>> {
            self.inner.search(vector, limit).await
        }
    }

    #[tokio::test]
    async fn test_failed_batch_reports_id_range() {
        let index = Arc::new(FlakyIndex {
            inner: MemoryIndex::new("c"),
            ok_batches: 1,
            calls: AtomicUsize::new(0),
        });
        let ingestor = Ingestor::new(
            Arc::new(HashProvider::new(8)),
            index.clone(),
            2,
            IdScheme::Position,
        );
        let records: Vec<_> = (0..5).map(|i| record(&format!("D{i}"), i)).collect();

        let err = ingestor.ingest(&records).await.unwrap_err();
        match err {
            Error::BatchUpsert {
                positions,
                first_id,
                last_id,
                ..
            } => {
                assert_eq!(positions, 2..4);
                assert_eq!((first_id, last_id), (2, 3));
            }
            other => panic!("unexpected error: {other}"),
        }
        // the first batch stays written
        assert_eq!(index.inner.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_content_hash_batch_reports_positions() {
        let index = Arc::new(FlakyIndex {
            inner: MemoryIndex::new("c"),
            ok_batches: 2,
            calls: AtomicUsize::new(0),
        });
        let ingestor = Ingestor::new(
            Arc::new(HashProvider::new(8)),
            index,
            2,
            IdScheme::ContentHash,
        );
        let records: Vec<_> = (0..5).map(|i| record(&format!("D{i}"), i)).collect();

        match ingestor.ingest(&records).await.unwrap_err() {
            Error::BatchUpsert {
                positions,
                first_id,
                last_id,
                ..
            } => {
                // last batch holds only the fifth record
                assert_eq!(positions, 4..5);
                assert_eq!(first_id, assign_id(&records[4], 4, IdScheme::ContentHash));
                assert_eq!(first_id, last_id);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
