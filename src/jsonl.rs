//! Line-delimited JSON persistence for built documents.
//!
//! Each line is `{"page_content": "...", "metadata": {...}}`. The symptom
//! and precaution lists are not stored; they are recoverable from the
//! content and are not needed downstream.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Document, DocumentMetadata};

/// One line of the intermediate file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub page_content: String,
    pub metadata: DocumentMetadata,
}

impl From<&Document> for DocumentRecord {
    fn from(doc: &Document) -> Self {
        Self {
            page_content: doc.content.clone(),
            metadata: doc.metadata.clone(),
        }
    }
}

impl DocumentRecord {
    /// Payload stored with the vector.
    pub fn payload(&self) -> serde_json::Map<String, serde_json::Value> {
        Document {
            content: self.page_content.clone(),
            metadata: self.metadata.clone(),
            symptoms: Vec::new(),
            precautions: Vec::new(),
        }
        .payload()
    }
}

/// Write documents to `path`, one JSON object per line. Parent directories
/// are created as needed; an existing file is replaced.
pub fn save_documents(docs: &[Document], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(std::fs::File::create(path)?);
    for doc in docs {
        serde_json::to_writer(&mut out, &DocumentRecord::from(doc))?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Read every record from a JSONL file. Blank lines are skipped.
pub fn load_documents(path: &Path) -> Result<Vec<DocumentRecord>> {
    if !path.is_file() {
        return Err(Error::MissingSource(path.to_path_buf()));
    }
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}
