//! Index backend capability.
//!
//! [`IndexBackend`] is the seam between orchestration (upload, ask, the job
//! runner, the CLI) and whatever builds and queries document indexes. The
//! default [`VectorIndexBackend`] chunks pages, embeds chunks with an
//! [`EmbeddingProvider`], keeps a flat [`VectorIndex`] and answers questions
//! through an [`LlmClient`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::chunk::chunk_units;
use crate::config::Config;
use crate::embedding::{create_provider, embed_batched, embed_query, EmbeddingProvider};
use crate::error::PipelineError;
use crate::extract::load_pdf;
use crate::index::VectorIndex;
use crate::llm::{create_llm_client, LlmSettings, PromptTemplate, SharedLlmClient};
use crate::models::{Answer, DocumentUnit};

pub type SharedBackend = Arc<dyn IndexBackend>;

#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Read a PDF into per-page units.
    async fn load_documents(&self, path: &Path) -> Result<Vec<DocumentUnit>, PipelineError>;

    /// Chunk and embed `units` into an in-memory index for `source`.
    async fn build_index(
        &self,
        source: &str,
        units: &[DocumentUnit],
    ) -> Result<VectorIndex, PipelineError>;

    async fn persist(&self, index: &VectorIndex, dir: &Path) -> Result<(), PipelineError> {
        index.persist(dir)
    }

    async fn load(&self, dir: &Path) -> Result<VectorIndex, PipelineError> {
        VectorIndex::load(dir)
    }

    /// Retrieve context for `question` and generate an answer.
    async fn query(&self, index: &VectorIndex, question: &str) -> Result<Answer, PipelineError>;
}

pub struct VectorIndexBackend {
    embedder: Arc<dyn EmbeddingProvider>,
    llm: SharedLlmClient,
    template: PromptTemplate,
    top_k: usize,
    max_tokens: usize,
}

impl VectorIndexBackend {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        llm: SharedLlmClient,
        template: PromptTemplate,
        top_k: usize,
        max_tokens: usize,
    ) -> Self {
        Self {
            embedder,
            llm,
            template,
            top_k,
            max_tokens,
        }
    }

    /// Wire the configured embedding provider and LLM client.
    pub fn from_config(config: &Config, settings: Arc<LlmSettings>) -> anyhow::Result<Self> {
        let embedder = create_provider(&config.embedding)?;
        let llm = create_llm_client(settings)?;
        Ok(Self::new(
            embedder,
            llm,
            PromptTemplate::default(),
            config.retrieval.similarity_top_k,
            config.chunking.max_tokens,
        ))
    }
}

#[async_trait]
impl IndexBackend for VectorIndexBackend {
    async fn load_documents(&self, path: &Path) -> Result<Vec<DocumentUnit>, PipelineError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || load_pdf(&path))
            .await
            .map_err(|e| PipelineError::DocumentLoad(e.to_string()))?
            .map_err(|e| PipelineError::DocumentLoad(e.to_string()))
    }

    async fn build_index(
        &self,
        source: &str,
        units: &[DocumentUnit],
    ) -> Result<VectorIndex, PipelineError> {
        let chunks = chunk_units(units, self.max_tokens);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_batched(self.embedder.as_ref(), &texts)
            .await
            .map_err(|e| PipelineError::IndexBuild(format!("{:#}", e)))?;
        VectorIndex::new(source, self.embedder.model_name(), chunks, vectors)
    }

    async fn query(&self, index: &VectorIndex, question: &str) -> Result<Answer, PipelineError> {
        let query_vec = embed_query(self.embedder.as_ref(), question)
            .await
            .map_err(|e| PipelineError::QueryExecution(format!("{:#}", e)))?;

        let sources = index.top_k(&query_vec, self.top_k);
        let context = sources
            .iter()
            .map(|s| s.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = self.template.format(&context, question);

        let text = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|e| PipelineError::QueryExecution(format!("{:#}", e)))?;

        Ok(Answer { text, sources })
    }
}
