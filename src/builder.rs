//! Canonical document construction.
//!
//! Merges the symptom table with a precaution lookup into one [`Document`]
//! per symptom-table row. Rendering is a pure function of the entity record
//! and the source file name, so identical rows always produce byte-identical
//! content.

use std::collections::HashMap;

use crate::models::{Document, DocumentMetadata, EntityRecord, SourceTable, TableRole};
use crate::schema::disease_of;

const DISCLAIMER: &str = "*Disclaimer: This information is for educational purposes only and is not a substitute for professional medical advice.*";

/// Disease name → precautions, built once from the precaution table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrecautionMap {
    entries: HashMap<String, Vec<String>>,
}

impl PrecautionMap {
    /// Build the lookup. Keys are trimmed disease names; a later row with the
    /// same key replaces the earlier one.
    pub fn from_table(table: &SourceTable) -> Self {
        let columns = table.role_columns(TableRole::Precaution);
        let mut entries = HashMap::new();
        for row in &table.rows {
            entries.insert(disease_of(row), collect_values(row, &columns));
        }
        Self { entries }
    }

    pub fn get(&self, disease: &str) -> &[String] {
        self.entries.get(disease).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Present, trimmed values of `columns`, in column order. Duplicates are kept.
fn collect_values(row: &HashMap<String, Option<String>>, columns: &[&str]) -> Vec<String> {
    columns
        .iter()
        .filter_map(|c| row.get(*c).and_then(|v| v.as_deref()))
        .map(str::trim)
        .filter(|v| !crate::table::is_missing(v))
        .map(str::to_string)
        .collect()
}

/// Build one document per symptom-table row, in row order.
pub fn build_documents(symptoms: &SourceTable, precautions: &PrecautionMap) -> Vec<Document> {
    let columns = symptoms.role_columns(TableRole::Symptom);

    symptoms
        .rows
        .iter()
        .enumerate()
        .map(|(row_id, row)| {
            let disease = disease_of(row);
            let record = EntityRecord {
                symptoms: collect_values(row, &columns),
                precautions: precautions.get(&disease).to_vec(),
                disease,
            };
            build_document(record, &symptoms.name, row_id)
        })
        .collect()
}

/// Turn a single entity record into a document.
pub fn build_document(record: EntityRecord, source: &str, row_id: usize) -> Document {
    let content = render_content(&record, source);
    Document {
        content,
        metadata: DocumentMetadata {
            disease: record.disease,
            symptom_count: record.symptoms.len(),
            precaution_count: record.precautions.len(),
            source: source.to_string(),
            row_id,
        },
        symptoms: record.symptoms,
        precautions: record.precautions,
    }
}

/// Render the canonical markdown-like text for a record.
pub fn render_content(record: &EntityRecord, source: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("# Disease: {}", record.disease));
    lines.push(String::new());

    lines.push("**Symptoms**".to_string());
    push_bullets(&mut lines, &record.symptoms, "No symptoms listed");
    lines.push(String::new());

    lines.push("**Precautions**".to_string());
    push_bullets(&mut lines, &record.precautions, "No precautions listed");
    lines.push(String::new());

    lines.push("---".to_string());
    lines.push(DISCLAIMER.to_string());
    lines.push(format!("*Source: {}*", source));
    lines.join("\n")
}

fn push_bullets(lines: &mut Vec<String>, items: &[String], placeholder: &str) {
    if items.is_empty() {
        lines.push(format!("- {}", placeholder));
    } else {
        lines.extend(items.iter().map(|i| format!("- {}", i)));
    }
}
