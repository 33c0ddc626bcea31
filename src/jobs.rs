//! Background indexing queue.
//!
//! Uploads enqueue an [`IndexJob`] and return immediately. A single runner
//! task drains the queue in order, builds each index and records the outcome
//! in the `index_status` table. Each job carries the id of the upload row it
//! was created for; an outcome is only recorded while that upload is still
//! the latest one for the file.

use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::SharedBackend;
use crate::error::ApiError;
use crate::locks::FileLocks;
use crate::metadata::MetadataStore;
use crate::models::IndexStatus;
use crate::pipeline::create_index_for_pdf;

#[derive(Debug, Clone)]
pub struct IndexJob {
    /// Sanitized filename.
    pub filename: String,
    /// Raw upload path.
    pub path: PathBuf,
    /// `pdf_documents` row id of the upload that scheduled this job.
    pub upload_id: i64,
}

/// Sending half of the job queue.
#[derive(Clone)]
pub struct IndexQueue {
    tx: mpsc::UnboundedSender<IndexJob>,
}

impl IndexQueue {
    pub fn schedule(&self, job: IndexJob) -> Result<(), ApiError> {
        let filename = job.filename.clone();
        self.tx
            .send(job)
            .map_err(|_| ApiError::IndexScheduling("index runner is not running".to_string()))?;
        tracing::info!(filename = %filename, "indexing scheduled");
        Ok(())
    }
}

/// Everything the runner needs to process a job.
#[derive(Clone)]
pub struct IndexRunner {
    pub store: MetadataStore,
    pub backend: SharedBackend,
    pub locks: FileLocks,
    pub indexes_dir: PathBuf,
}

impl IndexRunner {
    /// Start the runner task. It exits once every [`IndexQueue`] clone has
    /// been dropped and the queue is empty.
    pub fn spawn(self) -> (IndexQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<IndexJob>();
        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                self.run(job).await;
            }
            tracing::debug!("index runner stopped");
        });
        (IndexQueue { tx }, handle)
    }

    /// Process one job. Failures are recorded, never propagated.
    pub async fn run(&self, job: IndexJob) {
        tracing::info!(filename = %job.filename, "indexing started");

        let result = create_index_for_pdf(
            &job.path,
            &self.indexes_dir,
            self.backend.as_ref(),
            &self.locks,
        )
        .await;

        let recorded = match result {
            Ok(outcome) => {
                tracing::info!(
                    filename = %job.filename,
                    pages = outcome.pages,
                    chunks = outcome.chunks,
                    elapsed_ms = outcome.elapsed_ms as u64,
                    "indexing finished"
                );
                self.store
                    .finish_upload(&job.filename, job.upload_id, IndexStatus::Ready, None)
                    .await
            }
            Err(e) => {
                tracing::error!(filename = %job.filename, error = %e, "indexing failed");
                let message = e.to_string();
                self.store
                    .finish_upload(
                        &job.filename,
                        job.upload_id,
                        IndexStatus::Failed,
                        Some(&message),
                    )
                    .await
            }
        };

        match recorded {
            Ok(true) => {}
            Ok(false) => tracing::info!(
                filename = %job.filename,
                upload_id = job.upload_id,
                "status left to a newer upload"
            ),
            Err(e) => {
                tracing::error!(filename = %job.filename, error = %e, "could not record index status")
            }
        }
    }
}
