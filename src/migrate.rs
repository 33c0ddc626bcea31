use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Connect, create the schema, close the pool. Used by `pdf-query init`.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Upload log. No uniqueness on filename: re-uploads append rows unless
    // the replace policy deletes the older ones.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pdf_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            upload_date TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_status (
            filename TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            error TEXT,
            upload_id INTEGER,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Databases created before uploads were sequenced lack `upload_id`.
    let has_upload_id: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('index_status') WHERE name = 'upload_id'",
    )
    .fetch_one(pool)
    .await?;
    if has_upload_id == 0 {
        sqlx::query("ALTER TABLE index_status ADD COLUMN upload_id INTEGER")
            .execute(pool)
            .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pdf_documents_filename ON pdf_documents(filename)")
        .execute(pool)
        .await?;

    Ok(())
}
