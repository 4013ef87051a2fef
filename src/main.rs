//! # medrag CLI
//!
//! ## Usage
//!
//! ```bash
//! medrag --config ./config/medrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `medrag documents` | Detect CSV tables and write the JSONL document file |
//! | `medrag init` | Create the vector collection (idempotent) |
//! | `medrag ingest` | Embed documents and upsert them into the index |
//! | `medrag query "<text>"` | Print ranked retrieval results |
//! | `medrag ask "<question>"` | Answer a question from retrieved context |
//! | `medrag serve` | Start the HTTP API |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use medical_rag::config::{self, Config};
use medical_rag::{answer, ingest, logging, retrieval, server};

/// medrag: retrieval-augmented answers over disease, symptom and precaution tables.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/medrag.example.toml` for a full example. A missing
/// config file falls back to defaults only for `documents`.
#[derive(Parser)]
#[command(name = "medrag", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/medrag.toml")]
    config: PathBuf,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build documents from the CSV directory and write them as JSONL.
    Documents {
        /// Directory containing the CSV files (overrides `[data].dir`).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Output JSONL path (overrides `[data].documents`).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Create the vector collection sized for the embedding provider.
    Init,

    /// Embed the JSONL documents and upsert them into the index.
    Ingest {
        /// JSONL file to read (overrides `[data].documents`).
        #[arg(long)]
        documents: Option<PathBuf>,

        /// Points per embed + upsert batch (overrides `[index].batch_size`).
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Retrieve the documents closest to a query.
    Query {
        query: String,

        /// Maximum results; 0 or less uses `[retrieval].default_max_results`.
        #[arg(long, allow_hyphen_values = true)]
        limit: Option<i64>,
    },

    /// Answer a question using retrieved context.
    Ask {
        question: String,

        #[arg(long)]
        top_k: Option<i64>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn load(path: &Path) -> anyhow::Result<Config> {
    config::load_config(path).with_context(|| format!("loading config {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Documents { data_dir, out } => {
            let config = if cli.config.is_file() {
                load(&cli.config)?
            } else {
                Config::default()
            };
            ingest::run_documents(&config, data_dir.as_deref(), out.as_deref())
                .await
                .context("building documents")?;
        }
        Commands::Init => {
            let config = load(&cli.config)?;
            ingest::run_init(&config)
                .await
                .context("initializing collection")?;
        }
        Commands::Ingest {
            documents,
            batch_size,
        } => {
            let config = load(&cli.config)?;
            ingest::run_ingest(&config, documents.as_deref(), batch_size)
                .await
                .context("ingesting documents")?;
        }
        Commands::Query { query, limit } => {
            let config = load(&cli.config)?;
            retrieval::run_query(&config, &query, limit)
                .await
                .context("running query")?;
        }
        Commands::Ask { question, top_k } => {
            let config = load(&cli.config)?;
            answer::run_ask(&config, &question, top_k)
                .await
                .context("answering question")?;
        }
        Commands::Serve => {
            let config = load(&cli.config)?;
            server::run_server(&config)
                .await
                .context("running server")?;
        }
    }

    Ok(())
}
