//! Indexing and ask flows.
//!
//! Both the HTTP handlers and the CLI go through these functions so that the
//! validation order, the locking discipline and the error mapping are the
//! same everywhere.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::backend::IndexBackend;
use crate::config::Config;
use crate::error::{ApiError, PipelineError};
use crate::index::{index_dir, index_exists};
use crate::locks::FileLocks;
use crate::metadata::MetadataStore;
use crate::models::{Answer, IndexStatus};
use crate::sanitize::{has_pdf_extension, sanitize_filename};

/// Questions shorter than this (after trimming) are rejected. The question
/// itself is passed on as given.
pub const MIN_QUESTION_CHARS: usize = 3;

/// Result of a successful indexing run.
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub filename: String,
    pub dir: PathBuf,
    pub pages: usize,
    pub chunks: usize,
    pub elapsed_ms: u128,
}

/// Build and persist the index for the PDF at `path` into
/// `<indexes_dir>/<sanitized file name>/`.
///
/// The raw file is read under the document's read lock and the index is
/// written under its write lock.
pub async fn create_index_for_pdf(
    path: &Path,
    indexes_dir: &Path,
    backend: &dyn IndexBackend,
    locks: &FileLocks,
) -> Result<IndexOutcome, PipelineError> {
    let started = Instant::now();

    let filename = path
        .file_name()
        .map(|n| sanitize_filename(&n.to_string_lossy()))
        .ok_or_else(|| PipelineError::InvalidFile(path.display().to_string()))?;

    let units = {
        let _guard = locks.read(&filename).await;

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            _ => return Err(PipelineError::InvalidFile(path.display().to_string())),
        }
        if !has_pdf_extension(&filename) {
            return Err(PipelineError::UnsupportedFileType(filename));
        }

        backend.load_documents(path).await?
    };

    let index = backend.build_index(&filename, &units).await?;

    let dir = index_dir(indexes_dir, &filename);
    {
        let _guard = locks.write(&filename).await;
        backend.persist(&index, &dir).await?;
        if !index_exists(&dir) {
            return Err(PipelineError::IndexPersist(format!(
                "Index not saved: marker missing in {}",
                dir.display()
            )));
        }
    }

    Ok(IndexOutcome {
        filename,
        dir,
        pages: units.len(),
        chunks: index.chunks.len(),
        elapsed_ms: started.elapsed().as_millis(),
    })
}

/// Answer `question` about a previously uploaded document.
///
/// Checks run in a fixed order: raw file present, question long enough,
/// index marker present. Only then is the index loaded and queried.
pub async fn ask(
    config: &Config,
    store: &MetadataStore,
    backend: &dyn IndexBackend,
    locks: &FileLocks,
    filename: &str,
    question: &str,
) -> Result<Answer, ApiError> {
    let filename = sanitize_filename(filename);

    // "", "." and ".." resolve to directories, not uploads.
    let raw_path = config.storage.uploads_dir.join(&filename);
    let is_upload = tokio::fs::metadata(&raw_path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false);
    if !is_upload {
        return Err(ApiError::FileNotFound(filename));
    }

    if question.trim().chars().count() < MIN_QUESTION_CHARS {
        return Err(ApiError::QuestionTooShort);
    }

    let dir = index_dir(&config.storage.indexes_dir, &filename);
    let index = {
        let _guard = locks.read(&filename).await;
        if !index_exists(&dir) {
            let detail = status_detail(store, &filename).await;
            return Err(ApiError::IndexNotFound { filename, detail });
        }
        backend.load(&dir).await?
    };

    let started = Instant::now();
    let answer = backend.query(&index, question).await?;
    tracing::info!(
        filename = %filename,
        sources = answer.sources.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "question answered"
    );
    Ok(answer)
}

/// Suffix for `IndexNotFound` messages describing why the index is absent.
async fn status_detail(store: &MetadataStore, filename: &str) -> String {
    match store.get_status(filename).await {
        Ok(Some(record)) => match record.status {
            IndexStatus::Pending => " (indexing is still pending)".to_string(),
            IndexStatus::Failed => format!(
                " (indexing failed: {})",
                record.error.as_deref().unwrap_or("unknown error")
            ),
            IndexStatus::Ready => String::new(),
        },
        Ok(None) => String::new(),
        Err(e) => {
            tracing::warn!(filename = %filename, error = %e, "could not read index status");
            String::new()
        }
    }
}
