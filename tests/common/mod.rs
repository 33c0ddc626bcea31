#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use pdf_query::backend::{SharedBackend, VectorIndexBackend};
use pdf_query::config::Config;
use pdf_query::embedding::EmbeddingProvider;
use pdf_query::jobs::IndexRunner;
use pdf_query::llm::{LlmClient, PromptTemplate, SharedLlmClient};
use pdf_query::locks::FileLocks;
use pdf_query::metadata::MetadataStore;
use pdf_query::models::{IndexStatus, StatusRecord};
use pdf_query::server::AppState;
use pdf_query::{db, migrate};

pub const CANNED_ANSWER: &str = "Revenue grew twelve percent.";

/// Bag-of-words embedding hashed into 16 buckets.
pub struct HashEmbedder;

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-16"
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 16];
                for word in t.split_whitespace() {
                    let bucket = word
                        .to_lowercase()
                        .bytes()
                        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
                    v[bucket % 16] += 1.0;
                }
                v
            })
            .collect())
    }
}

pub struct CannedLlm;

#[async_trait]
impl LlmClient for CannedLlm {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok(CANNED_ANSWER.to_string())
    }
}

/// Completion client whose upstream is always down.
pub struct UnavailableLlm;

#[async_trait]
impl LlmClient for UnavailableLlm {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("upstream unavailable")
    }
}

fn backend_with(llm: SharedLlmClient) -> SharedBackend {
    Arc::new(VectorIndexBackend::new(
        Arc::new(HashEmbedder),
        llm,
        PromptTemplate::default(),
        2,
        512,
    ))
}

pub fn test_backend() -> SharedBackend {
    backend_with(Arc::new(CannedLlm))
}

/// Indexes normally; every completion fails.
pub fn unavailable_llm_backend() -> SharedBackend {
    backend_with(Arc::new(UnavailableLlm))
}

pub struct TestApp {
    pub tmp: TempDir,
    pub state: AppState,
    pub runner: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn start() -> Self {
        Self::start_with(test_backend(), true).await
    }

    /// Start with a custom backend. With `schema` false the database is
    /// left empty, so every metadata write fails.
    pub async fn start_with(backend: SharedBackend, schema: bool) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.uploads_dir = tmp.path().join("uploads");
        config.storage.indexes_dir = tmp.path().join("indexes");
        config.db.path = tmp.path().join("pdf_documents.db");

        let pool = db::connect(&config).await.unwrap();
        if schema {
            migrate::apply_schema(&pool).await.unwrap();
        }
        let store = MetadataStore::new(pool, config.metadata.on_duplicate);
        let locks = FileLocks::new();

        let (jobs, runner) = IndexRunner {
            store: store.clone(),
            backend: backend.clone(),
            locks: locks.clone(),
            indexes_dir: config.storage.indexes_dir.clone(),
        }
        .spawn();

        let state = AppState {
            config: Arc::new(config),
            store,
            backend,
            jobs,
            locks,
        };

        Self { tmp, state, runner }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.state.config.storage.uploads_dir
    }

    pub fn indexes_dir(&self) -> &Path {
        &self.state.config.storage.indexes_dir
    }

    /// Poll until the document leaves `pending`.
    pub async fn wait_for_index(&self, filename: &str) -> StatusRecord {
        for _ in 0..200 {
            if let Some(record) = self.state.store.get_status(filename).await.unwrap() {
                if record.status != IndexStatus::Pending {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("indexing of {} did not finish", filename);
    }
}

/// Single-page PDF showing `phrase`, with a correct xref table.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
        format!("<< /Length {} >> stream\n{}\nendstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
    }
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

pub const BOUNDARY: &str = "pdfquerytestboundary";

/// A `multipart/form-data` body with one file field.
pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}
