//! # pdf-query CLI
//!
//! ```bash
//! pdf-query --config ./config/pdf-query.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdf-query init` | Create the SQLite database and tables |
//! | `pdf-query serve` | Start the HTTP server |
//! | `pdf-query index <path>` | Build the index for a PDF synchronously |
//! | `pdf-query ask <filename> <question>` | Ask a question about an indexed PDF |
//! | `pdf-query documents` | List upload records |
//! | `pdf-query status <filename>` | Show a document's index status |
//!
//! Credentials come from the environment (`GOOGLE_API_KEY` or
//! `OPENAI_API_KEY`); a `.env` file in the working directory is loaded first.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use pdf_query::{commands, config, llm::LlmSettings, logging, migrate, server};

/// Upload PDFs, index them in the background and ask questions about them.
#[derive(Parser)]
#[command(name = "pdf-query", version)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/pdf-query.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and tables. Safe to run repeatedly.
    Init,

    /// Run the HTTP server.
    Serve,

    /// Build the index for a PDF and wait for it to finish.
    Index { path: PathBuf },

    /// Answer a question about an uploaded, indexed PDF.
    Ask { filename: String, question: String },

    /// List upload records.
    Documents,

    /// Show the index status of a document.
    Status { filename: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let cfg = config::load_or_default(&cli.config)?;
    logging::init_tracing(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            let settings = llm_settings(&cfg)?;
            server::run_server(cfg, settings).await?;
        }
        Commands::Index { path } => {
            let settings = llm_settings(&cfg)?;
            commands::run_index(&cfg, settings, &path).await?;
        }
        Commands::Ask { filename, question } => {
            let settings = llm_settings(&cfg)?;
            commands::run_ask(&cfg, settings, &filename, &question).await?;
        }
        Commands::Documents => {
            commands::run_documents(&cfg).await?;
        }
        Commands::Status { filename } => {
            commands::run_status(&cfg, &filename).await?;
        }
    }

    Ok(())
}

fn llm_settings(cfg: &config::Config) -> anyhow::Result<Arc<LlmSettings>> {
    let settings = LlmSettings::from_config(&cfg.llm).context("LLM configuration is invalid")?;
    tracing::info!(provider = ?settings.provider, model = %settings.model, "model configured");
    Ok(Arc::new(settings))
}
