//! Implementations of the non-server CLI commands.
//!
//! Each function opens what it needs from the configuration, does one thing
//! and prints a human-readable result to stdout.

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;

use crate::backend::VectorIndexBackend;
use crate::config::Config;
use crate::db;
use crate::llm::LlmSettings;
use crate::locks::FileLocks;
use crate::metadata::MetadataStore;
use crate::migrate::apply_schema;
use crate::models::IndexStatus;
use crate::pipeline::{ask, create_index_for_pdf};
use crate::sanitize::sanitize_filename;

async fn open_store(config: &Config) -> Result<MetadataStore> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    Ok(MetadataStore::new(pool, config.metadata.on_duplicate))
}

/// `pdf-query index <path>`: build the index synchronously and record its
/// status under the file's sanitized name.
pub async fn run_index(config: &Config, settings: Arc<LlmSettings>, path: &Path) -> Result<()> {
    let backend = VectorIndexBackend::from_config(config, settings)?;
    let store = open_store(config).await?;
    let filename = path
        .file_name()
        .map(|n| sanitize_filename(&n.to_string_lossy()))
        .unwrap_or_default();

    let result = create_index_for_pdf(
        path,
        &config.storage.indexes_dir,
        &backend,
        &FileLocks::new(),
    )
    .await;

    match result {
        Ok(outcome) => {
            store.set_status(&filename, IndexStatus::Ready, None).await?;
            store.close().await;
            println!(
                "Indexed {}: {} pages, {} chunks in {}ms → {}",
                outcome.filename,
                outcome.pages,
                outcome.chunks,
                outcome.elapsed_ms,
                outcome.dir.display()
            );
            Ok(())
        }
        Err(e) => {
            store
                .set_status(&filename, IndexStatus::Failed, Some(&e.to_string()))
                .await?;
            store.close().await;
            bail!(e)
        }
    }
}

/// `pdf-query ask <filename> <question>`.
pub async fn run_ask(
    config: &Config,
    settings: Arc<LlmSettings>,
    filename: &str,
    question: &str,
) -> Result<()> {
    let backend = VectorIndexBackend::from_config(config, settings)?;
    let store = open_store(config).await?;

    let result = ask(config, &store, &backend, &FileLocks::new(), filename, question).await;
    store.close().await;

    let answer = result?;
    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for s in &answer.sources {
            println!(
                "  page {} chunk {} (score {:.3})",
                s.chunk.page, s.chunk.chunk_index, s.score
            );
        }
    }
    Ok(())
}

/// `pdf-query documents`.
pub async fn run_documents(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let docs = store.list_documents().await?;
    store.close().await;

    if docs.is_empty() {
        println!("No documents uploaded.");
        return Ok(());
    }

    println!("{:<6} {:<40} UPLOADED", "ID", "FILENAME");
    for doc in docs {
        println!(
            "{:<6} {:<40} {}",
            doc.id,
            doc.filename,
            doc.upload_date.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// `pdf-query status <filename>`.
pub async fn run_status(config: &Config, filename: &str) -> Result<()> {
    let filename = sanitize_filename(filename);
    let store = open_store(config).await?;
    let record = store.get_status(&filename).await?;
    store.close().await;

    match record {
        Some(r) => {
            println!("{}: {} (updated {})", r.filename, r.status, r.updated_at.to_rfc3339());
            if let Some(err) = r.error {
                println!("  error: {}", err);
            }
            Ok(())
        }
        None => bail!("No index status recorded for {}", filename),
    }
}
