//! # medical-rag
//!
//! Retrieval-augmented question answering over a small structured medical
//! dataset: disease/symptom/precaution tables are normalized into text
//! documents, embedded, indexed, and retrieved to ground a language
//! model's answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐
//! │ CSV dir  │──▶│  Schema  │──▶│ Document │──▶│   JSONL   │
//! │          │   │ detector │   │ builder  │   │           │
//! └──────────┘   └──────────┘   └──────────┘   └─────┬─────┘
//!                                                    │ embed + upsert
//!                                                    ▼
//!   ┌──────────┐   ┌────────────┐   ┌──────────────────────────┐
//!   │ Answerer │◀──│ Retrieval  │◀──│ Vector index             │
//!   │ CLI/HTTP │   │  adapter   │   │ memory / qdrant / sqlite │
//!   └──────────┘   └────────────┘   └──────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! medrag documents              # CSV → data/documents.jsonl
//! medrag init                   # create the collection
//! medrag ingest                 # embed + upsert
//! medrag query "itching and skin rash"
//! medrag serve                  # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`table`] | CSV source reading |
//! | [`schema`] | Table role detection |
//! | [`builder`] | Canonical document construction |
//! | [`jsonl`] | Intermediate document file |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index backends |
//! | [`search`] | Score normalization and hybrid blending |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieval`] | Retrieval adapters |
//! | [`answer`] | Question answering |
//! | [`server`] | HTTP API |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Hybrid index schema |

pub mod answer;
pub mod builder;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod jsonl;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod schema;
pub mod search;
pub mod server;
pub mod table;
