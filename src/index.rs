//! Persisted flat vector index.
//!
//! An index directory holds three JSON files:
//!
//! | File | Contents |
//! |------|----------|
//! | `vector_store.json` | chunk id → embedding |
//! | `index_store.json` | embedding model, dimensions, chunk count, build time |
//! | `docstore.json` | chunks (id, page, index, text, hash) |
//!
//! `docstore.json` is the completion marker. It is written last, via a
//! temporary file and a rename, so a reader that sees it also sees the other
//! two files in full.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::embedding::cosine_similarity;
use crate::error::PipelineError;
use crate::models::{Chunk, ScoredChunk};

pub const MARKER_FILE: &str = "docstore.json";
const VECTOR_STORE_FILE: &str = "vector_store.json";
const INDEX_STORE_FILE: &str = "index_store.json";

/// In-memory form of a document's index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    pub meta: IndexMeta,
    pub chunks: Vec<Chunk>,
    /// Parallel to `chunks`.
    pub vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub source: String,
    pub embedding_model: String,
    pub dims: usize,
    pub chunk_count: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct DocStore {
    chunks: Vec<Chunk>,
}

#[derive(Serialize, Deserialize)]
struct VectorStore {
    embeddings: HashMap<String, Vec<f32>>,
}

/// `<indexes_dir>/<filename>`.
pub fn index_dir(indexes_dir: &Path, filename: &str) -> PathBuf {
    indexes_dir.join(filename)
}

/// True when the marker file is present.
pub fn index_exists(dir: &Path) -> bool {
    dir.join(MARKER_FILE).is_file()
}

impl VectorIndex {
    /// Pair chunks with their vectors. All vectors must share one
    /// non-zero dimension.
    pub fn new(
        source: &str,
        embedding_model: &str,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, PipelineError> {
        if chunks.is_empty() {
            return Err(PipelineError::IndexBuild(
                "no chunks to index".to_string(),
            ));
        }
        if chunks.len() != vectors.len() {
            return Err(PipelineError::IndexBuild(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let dims = vectors[0].len();
        if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
            return Err(PipelineError::IndexBuild(
                "embedding vectors have inconsistent dimensions".to_string(),
            ));
        }

        Ok(Self {
            meta: IndexMeta {
                source: source.to_string(),
                embedding_model: embedding_model.to_string(),
                dims,
                chunk_count: chunks.len(),
                built_at: Utc::now(),
            },
            chunks,
            vectors,
        })
    }

    /// The `k` chunks most similar to `query`, best first. Ties keep
    /// document order.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }

    /// Write the index into `dir` (created if absent) and confirm the marker
    /// exists afterwards.
    pub fn persist(&self, dir: &Path) -> Result<(), PipelineError> {
        let persist_err = |e: std::io::Error| PipelineError::IndexPersist(e.to_string());

        std::fs::create_dir_all(dir).map_err(persist_err)?;

        // A stale marker from an earlier build must not vouch for the new files.
        match std::fs::remove_file(dir.join(MARKER_FILE)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(persist_err(e)),
        }

        let vector_store = VectorStore {
            embeddings: self
                .chunks
                .iter()
                .zip(self.vectors.iter())
                .map(|(c, v)| (c.id.clone(), v.clone()))
                .collect(),
        };
        write_json(&dir.join(VECTOR_STORE_FILE), &vector_store)?;
        write_json(&dir.join(INDEX_STORE_FILE), &self.meta)?;
        write_json(
            &dir.join(MARKER_FILE),
            &DocStore {
                chunks: self.chunks.clone(),
            },
        )?;

        if !index_exists(dir) {
            return Err(PipelineError::IndexPersist(format!(
                "Index not saved: {}/{} missing",
                dir.display(),
                MARKER_FILE
            )));
        }
        Ok(())
    }

    /// Read an index previously written by [`VectorIndex::persist`].
    pub fn load(dir: &Path) -> Result<Self, PipelineError> {
        let doc_store: DocStore = read_json(&dir.join(MARKER_FILE))?;
        let meta: IndexMeta = read_json(&dir.join(INDEX_STORE_FILE))?;
        let mut vector_store: VectorStore = read_json(&dir.join(VECTOR_STORE_FILE))?;

        let mut vectors = Vec::with_capacity(doc_store.chunks.len());
        for chunk in &doc_store.chunks {
            let vector = vector_store.embeddings.remove(&chunk.id).ok_or_else(|| {
                PipelineError::IndexLoad(format!("no embedding stored for chunk {}", chunk.id))
            })?;
            if vector.len() != meta.dims {
                return Err(PipelineError::IndexLoad(format!(
                    "chunk {} has {} dimensions, index declares {}",
                    chunk.id,
                    vector.len(),
                    meta.dims
                )));
            }
            vectors.push(vector);
        }

        Ok(Self {
            meta,
            chunks: doc_store.chunks,
            vectors,
        })
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let tmp = path.with_extension("json.tmp");
    let bytes =
        serde_json::to_vec(value).map_err(|e| PipelineError::IndexPersist(e.to_string()))?;
    std::fs::write(&tmp, bytes)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|e| PipelineError::IndexPersist(format!("{}: {}", path.display(), e)))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, PipelineError> {
    let bytes = std::fs::read(path)
        .map_err(|e| PipelineError::IndexLoad(format!("{}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PipelineError::IndexLoad(format!("{}: {}", path.display(), e)))
}
