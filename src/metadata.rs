//! SQLite-backed metadata store.
//!
//! Holds the upload log (`pdf_documents`) and the per-document index status
//! (`index_status`). The query path never reads the upload log; it exists for
//! bookkeeping and the `documents` CLI command.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::config::DuplicatePolicy;
use crate::models::{DocumentRecord, IndexStatus, StatusRecord};

#[derive(Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
    on_duplicate: DuplicatePolicy,
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp in metadata store: {}", raw))?
        .with_timezone(&Utc))
}

impl MetadataStore {
    pub fn new(pool: SqlitePool, on_duplicate: DuplicatePolicy) -> Self {
        Self { pool, on_duplicate }
    }

    /// Record an upload. Runs in a transaction; on error nothing is committed.
    ///
    /// Under [`DuplicatePolicy::Replace`] earlier rows for the same filename
    /// are deleted in the same transaction.
    pub async fn insert_document(&self, filename: &str) -> Result<DocumentRecord> {
        let upload_date = Utc::now();
        let mut tx = self.pool.begin().await?;

        if self.on_duplicate == DuplicatePolicy::Replace {
            sqlx::query("DELETE FROM pdf_documents WHERE filename = ?")
                .bind(filename)
                .execute(&mut *tx)
                .await?;
        }

        let inserted = sqlx::query("INSERT INTO pdf_documents (filename, upload_date) VALUES (?, ?)")
            .bind(filename)
            .bind(upload_date.to_rfc3339())
            .execute(&mut *tx)
            .await;

        let id = match inserted {
            Ok(done) => done.last_insert_rowid(),
            Err(e) => {
                tx.rollback().await?;
                return Err(e.into());
            }
        };

        tx.commit().await?;

        Ok(DocumentRecord {
            id,
            filename: filename.to_string(),
            upload_date,
        })
    }

    /// All upload rows, oldest first.
    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query("SELECT id, filename, upload_date FROM pdf_documents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let raw: String = row.get("upload_date");
                Ok(DocumentRecord {
                    id: row.get("id"),
                    filename: row.get("filename"),
                    upload_date: parse_ts(&raw)?,
                })
            })
            .collect()
    }

    pub async fn count_for(&self, filename: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pdf_documents WHERE filename = ?")
            .bind(filename)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Set a status without tying it to an upload. Used by the `index` CLI
    /// command; the row's `upload_id` is left as it was.
    pub async fn set_status(
        &self,
        filename: &str,
        status: IndexStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_status (filename, status, error, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(filename) DO UPDATE SET
                status = excluded.status,
                error = excluded.error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(filename)
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark `filename` pending for the upload with row id `upload_id`. Later
    /// uploads always carry a larger id.
    pub async fn mark_pending(&self, filename: &str, upload_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_status (filename, status, error, upload_id, updated_at)
            VALUES (?, ?, NULL, ?, ?)
            ON CONFLICT(filename) DO UPDATE SET
                status = excluded.status,
                error = NULL,
                upload_id = excluded.upload_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(filename)
        .bind(IndexStatus::Pending.as_str())
        .bind(upload_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record the outcome of indexing upload `upload_id`. Returns `false`
    /// and writes nothing when a newer upload of the same file has since
    /// been marked pending.
    pub async fn finish_upload(
        &self,
        filename: &str,
        upload_id: i64,
        status: IndexStatus,
        error: Option<&str>,
    ) -> Result<bool> {
        let done = sqlx::query(
            r#"
            UPDATE index_status
            SET status = ?, error = ?, updated_at = ?
            WHERE filename = ? AND upload_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(filename)
        .bind(upload_id)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn get_status(&self, filename: &str) -> Result<Option<StatusRecord>> {
        let row = sqlx::query(
            "SELECT filename, status, error, updated_at FROM index_status WHERE filename = ?",
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.get("status");
        let updated_at: String = row.get("updated_at");
        Ok(Some(StatusRecord {
            filename: row.get("filename"),
            status: status.parse().map_err(anyhow::Error::msg)?,
            error: row.get("error"),
            updated_at: parse_ts(&updated_at)?,
        }))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
