//! In-memory [`VectorIndex`] for tests and one-shot runs.
//!
//! Points live in a `BTreeMap` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every stored vector. Nothing is
//! persisted.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{check_points, check_spec_name, rank, CollectionSpec, VectorIndex};
use crate::embedding::{check_dims, cosine_similarity};
use crate::error::{Error, Result};
use crate::models::{Point, ScoredPoint};

struct StoredPoint {
    vector: Vec<f32>,
    payload: Map<String, Value>,
}

struct Collection {
    dims: usize,
    points: BTreeMap<u64, StoredPoint>,
}

pub struct MemoryIndex {
    collection: String,
    state: RwLock<Option<Collection>>,
}

impl MemoryIndex {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            state: RwLock::new(None),
        }
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.read()
            .ok()
            .and_then(|s| s.as_ref().map(|c| c.points.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Option<Collection>>> {
        self.state
            .read()
            .map_err(|_| Error::backend("memory", "index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Option<Collection>>> {
        self.state
            .write()
            .map_err(|_| Error::backend("memory", "index lock poisoned"))
    }

    fn missing(&self) -> Error {
        Error::backend(
            "memory",
            format!("collection '{}' does not exist", self.collection),
        )
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()> {
        check_spec_name(self, spec)?;
        let mut state = self.write()?;
        match state.as_ref() {
            Some(existing) if existing.dims != spec.dims => Err(Error::CollectionConflict {
                name: spec.name.clone(),
                existing: existing.dims,
                requested: spec.dims,
            }),
            Some(_) => Ok(()),
            None => {
                *state = Some(Collection {
                    dims: spec.dims,
                    points: BTreeMap::new(),
                });
                Ok(())
            }
        }
    }

    async fn upsert(&self, points: &[Point]) -> Result<()> {
        let mut state = self.write()?;
        let collection = state.as_mut().ok_or_else(|| self.missing())?;
        check_points(collection.dims, points)?;
        for p in points {
            collection.points.insert(
                p.id,
                StoredPoint {
                    vector: p.vector.clone(),
                    payload: p.payload.clone(),
                },
            );
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let state = self.read()?;
        let collection = state.as_ref().ok_or_else(|| self.missing())?;
        check_dims(collection.dims, vector)?;

        let hits = collection
            .points
            .iter()
            .map(|(id, p)| ScoredPoint {
                id: *id,
                score: cosine_similarity(vector, &p.vector) as f64,
                payload: Some(p.payload.clone()),
            })
            .collect();
        Ok(rank(hits, limit))
    }
}
