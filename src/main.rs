//! # condo-rag CLI (`crag`)
//!
//! ## Usage
//!
//! ```bash
//! crag --config ./config/crag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crag init` | Write a default configuration file |
//! | `crag ingest <file>` | Index a PDF or text file into a building's namespace |
//! | `crag kb-add <file>` | Index a file into the shared general knowledge base |
//! | `crag ask "<question>"` | Answer a question for a building |
//! | `crag delete <doc_id>` | Remove every chunk of a document |
//! | `crag classify <file>` | Dry run: document type and chunk counts |
//! | `crag history` | Recent questions from the audit trail |
//!
//! Secrets are read from the environment: `OPENAI_API_KEY` and the Pinecone
//! key variable named in `[vector_store].api_key_env`.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use condo_rag::config::{self, Config};
use condo_rag::{ask, backends, ingest};
use condo_rag_core::models::SearchMode;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tenant-isolated question answering over condominium documents.
#[derive(Parser)]
#[command(name = "crag", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/crag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file to `--config`.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Index a PDF or text file for one building.
    ///
    /// Re-ingesting an unchanged file stores nothing new.
    Ingest {
        file: PathBuf,
        #[arg(long)]
        tenant: u64,
        #[arg(long)]
        sub: u64,
        /// Document title. Defaults to the file name.
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "general")]
        category: String,
        /// Stable document id. Defaults to a slug of the title.
        #[arg(long)]
        id: Option<String>,
    },

    /// Index a file into the shared general knowledge base.
    KbAdd {
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "general")]
        category: String,
    },

    /// Ask a question on behalf of one building.
    Ask {
        question: String,
        #[arg(long)]
        tenant: u64,
        #[arg(long)]
        sub: u64,
        /// `condo_only`, `kb_only` or `hybrid`.
        #[arg(long, default_value = "condo_only")]
        mode: SearchMode,
        /// Print the answer as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove every indexed chunk of a document from a building.
    Delete {
        document_id: String,
        #[arg(long)]
        tenant: u64,
        #[arg(long)]
        sub: u64,
    },

    /// Show the detected document type and chunking of a file.
    Classify { file: PathBuf },

    /// List recent questions recorded in the audit trail.
    History {
        #[arg(long)]
        tenant: u64,
        #[arg(long)]
        sub: u64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

/// `RUST_LOG` wins; otherwise the configured level.
fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = &cli.command {
        init_logging("info");
        if cli.config.exists() && !force {
            bail!(
                "{} already exists; pass --force to overwrite",
                cli.config.display()
            );
        }
        if let Some(parent) = cli.config.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&cli.config, config::default_config_toml()?)?;
        println!("wrote {}", cli.config.display());
        println!("set vector_store.host and export OPENAI_API_KEY / PINECONE_API_KEY");
        return Ok(());
    }

    let cfg: Config = config::load_config(&cli.config)?;
    init_logging(&cfg.logging.level);

    match cli.command {
        Commands::Init { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
        Commands::Classify { file } => ingest::run_classify(&cfg, &file)?,
        Commands::History { tenant, sub, limit } => {
            let Some(audit) = backends::open_audit(&cfg).await? else {
                bail!("Audit trail is disabled ([audit].enabled = false)");
            };
            ask::run_history(&audit, tenant, sub, limit).await?;
        }
        Commands::Ingest {
            file,
            tenant,
            sub,
            title,
            category,
            id,
        } => {
            let pipeline = backends::build_pipeline(&cfg).await?;
            ingest::run_ingest(&pipeline, &file, tenant, sub, title, &category, id).await?;
        }
        Commands::KbAdd {
            file,
            title,
            category,
        } => {
            let pipeline = backends::build_pipeline(&cfg).await?;
            ingest::run_kb_add(&pipeline, &file, title, &category).await?;
        }
        Commands::Ask {
            question,
            tenant,
            sub,
            mode,
            json,
        } => {
            let pipeline = backends::build_pipeline(&cfg).await?;
            ask::run_ask(&pipeline, &question, tenant, sub, mode, json).await?;
        }
        Commands::Delete {
            document_id,
            tenant,
            sub,
        } => {
            let pipeline = backends::build_pipeline(&cfg).await?;
            ingest::run_delete(&pipeline, &document_id, tenant, sub).await?;
        }
    }

    Ok(())
}
