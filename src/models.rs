//! Core data models used throughout the pipeline.
//!
//! These types represent the source tables, documents, vector records, and
//! retrieval results that flow from CSV ingestion to the answering component.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical name of the disease column after normalization.
pub const DISEASE_COLUMN: &str = "Disease";

/// Payload key that carries the document text inside a vector record.
pub const CONTENT_KEY: &str = "page_content";

/// Role a source table plays in the two-table schema family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableRole {
    /// `Disease, Symptom_1..N`
    Symptom,
    /// `Disease, Precaution_1..M`
    Precaution,
}

impl TableRole {
    /// Lowercase column-name prefix that identifies this role.
    pub fn column_prefix(&self) -> &'static str {
        match self {
            TableRole::Symptom => "symptom",
            TableRole::Precaution => "precaution",
        }
    }
}

impl fmt::Display for TableRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_prefix())
    }
}

/// A tabular source read once per ingest run.
///
/// Cells are `None` when the CSV value was empty or one of the missing
/// tokens (`nan`, `none`). Present cells keep their original text.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    /// File name (no directory), used as the document source tag.
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, Option<String>>>,
}

impl SourceTable {
    /// Columns whose lowercase name starts with the role's prefix, in header order.
    pub fn role_columns(&self, role: TableRole) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.to_lowercase().starts_with(role.column_prefix()))
            .map(String::as_str)
            .collect()
    }

    pub fn matches_role(&self, role: TableRole) -> bool {
        !self.role_columns(role).is_empty()
    }
}

/// Normalized per-row aggregation of a disease's symptoms and precautions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub disease: String,
    pub symptoms: Vec<String>,
    pub precautions: Vec<String>,
}

/// Structured metadata attached to every document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub disease: String,
    pub symptom_count: usize,
    pub precaution_count: usize,
    pub source: String,
    pub row_id: usize,
}

/// Canonical text plus metadata, the unit of indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
    pub symptoms: Vec<String>,
    pub precautions: Vec<String>,
}

impl Document {
    /// Payload stored next to the vector: metadata fields plus `page_content`.
    pub fn payload(&self) -> Map<String, Value> {
        let mut map = match serde_json::to_value(&self.metadata) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        map.insert(CONTENT_KEY.to_string(), Value::String(self.content.clone()));
        map
    }
}

/// A vector record ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

/// A native search hit from a vector index. `payload` is `None` when the
/// backend returned a hit without one.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f64,
    pub payload: Option<Map<String, Value>>,
}

/// A ranked document handed to the answering component.
///
/// Score scale depends on the backend (cosine similarity for dedicated
/// indexes, blended `[0, 1]` score for hybrid ones).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl RetrievedDocument {
    /// Splits a payload into `content` (from `page_content`) and the remaining metadata.
    pub fn from_payload(payload: Option<Map<String, Value>>, score: Option<f64>) -> Self {
        let mut metadata = payload.unwrap_or_default();
        let content = match metadata.remove(CONTENT_KEY) {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Self {
            content,
            metadata,
            score,
        }
    }
}
