//! Core data types shared by the HTTP layer, the metadata store and the
//! indexing/query pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A row of the `pdf_documents` table.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub filename: String,
    pub upload_date: DateTime<Utc>,
}

/// Lifecycle of a document's index artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Pending,
    Ready,
    Failed,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Pending => "pending",
            IndexStatus::Ready => "ready",
            IndexStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IndexStatus::Pending),
            "ready" => Ok(IndexStatus::Ready),
            "failed" => Ok(IndexStatus::Failed),
            other => Err(format!("unknown index status: {}", other)),
        }
    }
}

/// A row of the `index_status` table.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    pub filename: String,
    pub status: IndexStatus,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One page of text extracted from a PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUnit {
    /// File name the unit was loaded from.
    pub source: String,
    /// 1-based page number.
    pub page: usize,
    pub text: String,
}

/// A retrievable piece of a document unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub page: usize,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// A chunk selected for a query together with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Generated answer plus the chunks it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredChunk>,
}
