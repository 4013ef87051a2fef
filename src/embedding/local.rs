//! Local sentence-transformer embeddings via fastembed.
//!
//! The model is downloaded from Hugging Face on first use and cached; later
//! runs are fully offline. Inference is CPU-bound and runs on the blocking
//! thread pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

const DEFAULT_MODEL: &str = "all-minilm-l6-v2";
const BATCH_SIZE: usize = 64;

pub struct LocalProvider {
    model_name: String,
    dims: usize,
    model: fastembed::EmbeddingModel,
    loaded: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let (model, native_dims) = resolve_model(&model_name)?;
        let dims = config.dims.unwrap_or(native_dims);
        Ok(Self {
            model_name,
            dims,
            model,
            loaded: Arc::new(Mutex::new(None)),
        })
    }
}

fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel as M;
    match name {
        "all-minilm-l6-v2" => Ok((M::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((M::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((M::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((M::BGELargeENV15, 1024)),
        "multilingual-e5-small" => Ok((M::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((M::MultilingualE5Base, 768)),
        other => Err(Error::Config(format!(
            "unknown local embedding model '{}'. Supported: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base",
            other
        ))),
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let texts = texts.to_vec();
        let loaded = Arc::clone(&self.loaded);
        let model = self.model.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = loaded
                .lock()
                .map_err(|_| Error::backend("local", "embedding model lock poisoned"))?;
            if guard.is_none() {
                let init = fastembed::InitOptions::new(model).with_show_download_progress(true);
                let embedder = fastembed::TextEmbedding::try_new(init).map_err(|e| {
                    Error::backend("local", format!("failed to initialize model: {}", e))
                })?;
                *guard = Some(embedder);
            }
            let embedder = guard
                .as_mut()
                .ok_or_else(|| Error::backend("local", "embedding model not loaded"))?;
            embedder
                .embed(texts, Some(BATCH_SIZE))
                .map_err(|e| Error::backend("local", format!("embedding failed: {}", e)))
        })
        .await
        .map_err(|e| Error::backend("local", format!("embedding task failed: {}", e)))?
    }
}
