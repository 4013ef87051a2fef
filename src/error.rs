//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Every fallible library operation returns [`Result`]. Callers that need to
//! decide between aborting, asking the operator for better input, or retrying
//! a batch can branch on [`Error::kind`] instead of matching variants.

use std::ops::Range;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::TableRole;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal, never retried: bad config, missing inputs or credentials,
    /// vector dimension disagreements.
    Configuration,
    /// Source tables did not match the expected schema family.
    Schema,
    /// Network or storage backend failure. The caller decides whether to retry.
    Transient,
    /// Local I/O or serialization failure.
    Io,
}

/// Errors produced by the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing source: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("missing credential: {0} is not set")]
    MissingCredential(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "collection '{name}' already exists with dimension {existing}, requested {requested}"
    )]
    CollectionConflict {
        name: String,
        existing: usize,
        requested: usize,
    },

    #[error("no symptom table found among {candidates} candidate file(s)")]
    SchemaNotFound { candidates: usize },

    #[error("ambiguous {role} table: both '{first}' and '{second}' match")]
    AmbiguousRole {
        role: TableRole,
        first: String,
        second: String,
    },

    #[error("failed to read table {}: {source}", .path.display())]
    Table {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{backend} backend error: {message}")]
    Backend { backend: String, message: String },

    /// `positions` is the failed batch's record range within the ingest input.
    #[error("upsert failed for records {}..{} (ids {first_id}..={last_id}): {source}", .positions.start, .positions.end)]
    BatchUpsert {
        positions: Range<usize>,
        first_id: u64,
        last_id: u64,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_)
            | Error::MissingSource(_)
            | Error::MissingCredential(_)
            | Error::DimensionMismatch { .. }
            | Error::CollectionConflict { .. } => ErrorKind::Configuration,
            Error::SchemaNotFound { .. } | Error::AmbiguousRole { .. } => ErrorKind::Schema,
            Error::Backend { .. }
            | Error::BatchUpsert { .. }
            | Error::Sqlx(_)
            | Error::Http(_) => ErrorKind::Transient,
            Error::Table { .. } | Error::Io(_) | Error::Json(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
