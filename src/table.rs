//! CSV source discovery and parsing.
//!
//! Reads UTF-8 comma-separated files with a header row into
//! [`SourceTable`]s. Empty cells and the literal tokens `nan` / `none`
//! (any case) are stored as absent.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::models::SourceTable;

/// Returns `true` when a raw cell value counts as missing.
pub fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("none")
}

/// List the `.csv` files directly inside `dir`, sorted by file name.
///
/// Sorting fixes the enumeration order the schema detector sees, so a run
/// over the same directory always considers files in the same order.
pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::MissingSource(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(Error::MissingSource(dir.join("*.csv")));
    }
    Ok(files)
}

/// Read a CSV file into a [`SourceTable`] named after the file.
pub fn read_table(path: &Path) -> Result<SourceTable> {
    if !path.is_file() {
        return Err(Error::MissingSource(path.to_path_buf()));
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let file = std::fs::File::open(path)?;
    parse_table(&name, file).map_err(|source| Error::Table {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse CSV text from any reader. The first record is the header.
pub fn parse_table<R: Read>(name: &str, reader: R) -> std::result::Result<SourceTable, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let mut row = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            let cell = record
                .get(i)
                .filter(|v| !is_missing(v))
                .map(|v| v.to_string());
            row.insert(column.clone(), cell);
        }
        rows.push(row);
    }

    debug!(table = name, columns = columns.len(), rows = rows.len(), "parsed csv table");

    Ok(SourceTable {
        name: name.to_string(),
        columns,
        rows,
    })
}
