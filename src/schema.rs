//! Heuristic schema detection over tabular sources.
//!
//! Each table is classified by its header: any column starting with
//! `symptom` (case-insensitive) marks a symptom table, any column starting
//! with `precaution` marks a precaution table. A single file may carry both
//! roles. Two files claiming the same role is an error rather than a silent
//! last-match-wins.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{SourceTable, TableRole, DISEASE_COLUMN};
use crate::table::read_table;

/// The tables selected for one ingest run.
#[derive(Debug, Clone)]
pub struct DetectedSources {
    pub symptom: SourceTable,
    pub precaution: Option<SourceTable>,
}

/// Classify already-loaded tables, in the given order.
///
/// # Errors
///
/// - [`Error::AmbiguousRole`] when two tables match the same role.
/// - [`Error::SchemaNotFound`] when no table matches the symptom role.
pub fn detect_roles(tables: Vec<SourceTable>) -> Result<DetectedSources> {
    let candidates = tables.len();
    let mut symptom: Option<SourceTable> = None;
    let mut precaution: Option<SourceTable> = None;

    for table in tables {
        for role in [TableRole::Symptom, TableRole::Precaution] {
            if !table.matches_role(role) {
                continue;
            }
            let slot = match role {
                TableRole::Symptom => &mut symptom,
                TableRole::Precaution => &mut precaution,
            };
            if let Some(existing) = slot {
                return Err(Error::AmbiguousRole {
                    role,
                    first: existing.name.clone(),
                    second: table.name.clone(),
                });
            }
            *slot = Some(table.clone());
        }
    }

    let mut symptom = symptom.ok_or(Error::SchemaNotFound { candidates })?;
    normalize_disease_column(&mut symptom);
    info!(table = %symptom.name, "symptom table detected");

    match precaution.as_mut() {
        Some(table) => {
            normalize_disease_column(table);
            info!(table = %table.name, "precaution table detected");
        }
        None => info!("no precaution table detected, precautions will be empty"),
    }

    Ok(DetectedSources {
        symptom,
        precaution,
    })
}

/// Read every path and classify the resulting tables.
///
/// Files that fail to parse are skipped with a warning and never selected.
pub fn detect_files(paths: &[PathBuf]) -> Result<DetectedSources> {
    let mut tables = Vec::with_capacity(paths.len());
    for path in paths {
        match read_table(path) {
            Ok(table) => tables.push(table),
            Err(Error::Table { path, source }) => {
                warn!(path = %path.display(), error = %source, "skipping unreadable table");
            }
            Err(e) => return Err(e),
        }
    }
    if tables.is_empty() {
        return Err(Error::SchemaNotFound {
            candidates: paths.len(),
        });
    }
    detect_roles(tables)
}

/// Rename the disease column to the canonical `Disease` key.
///
/// If no column is named exactly `Disease`, the first column whose lowercase
/// name contains `disease` is renamed. When none exists the table is left
/// untouched and every row resolves to an empty disease name.
pub fn normalize_disease_column(table: &mut SourceTable) {
    if table.columns.iter().any(|c| c == DISEASE_COLUMN) {
        return;
    }
    let Some(pos) = table
        .columns
        .iter()
        .position(|c| c.to_lowercase().contains("disease"))
    else {
        return;
    };

    let old = std::mem::replace(&mut table.columns[pos], DISEASE_COLUMN.to_string());
    for row in &mut table.rows {
        if let Some(value) = row.remove(&old) {
            row.insert(DISEASE_COLUMN.to_string(), value);
        }
    }
}

/// Trimmed disease name of a row, or `""` if the column is missing or empty.
pub fn disease_of(row: &std::collections::HashMap<String, Option<String>>) -> String {
    row.get(DISEASE_COLUMN)
        .and_then(|v| v.as_deref())
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}
