//! TOML configuration.
//!
//! Every section is optional; a missing section (or a missing file, see
//! [`load_or_default`]) falls back to the defaults below, which reproduce the
//! service's stock layout: `uploads/`, `indexes/`, `pdf_documents.db`, Gemini
//! for embeddings and completions.
//!
//! Provider credentials never live in the file. They are read from the
//! environment (`GOOGLE_API_KEY` or `OPENAI_API_KEY`) when the provider is
//! constructed; a `.env` file in the working directory is honored.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default = "default_indexes_dir")]
    pub indexes_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            indexes_dir: default_indexes_dir(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}
fn default_indexes_dir() -> PathBuf {
    PathBuf::from("indexes")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("pdf_documents.db")
}

/// What to do with existing metadata rows when a filename is uploaded again.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep every upload as its own row (audit history).
    #[default]
    Append,
    /// Delete earlier rows for the filename before inserting the new one.
    Replace,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MetadataConfig {
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    512
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_similarity_top_k")]
    pub similarity_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: default_similarity_top_k(),
        }
    }
}

fn default_similarity_top_k() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL override (mock servers, proxies, OpenAI-compatible gateways).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_embedding_model() -> String {
    "models/embedding-001".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            url: None,
        }
    }
}

fn default_llm_model() -> String {
    "models/gemini-1.5-flash".to_string()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_max_output_tokens() -> u32 {
    256
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Append logs to this file in addition to stdout.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens == 0 {
            bail!("chunking.max_tokens must be > 0");
        }

        if self.retrieval.similarity_top_k < 1 {
            bail!("retrieval.similarity_top_k must be >= 1");
        }

        if self.llm.max_output_tokens == 0 {
            bail!("llm.max_output_tokens must be > 0");
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("llm.temperature must be in [0.0, 2.0]");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "gemini" | "openai" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, gemini, or openai.",
                other
            ),
        }

        match self.llm.provider.as_str() {
            "gemini" | "openai" => {}
            other => bail!(
                "Unknown llm provider: '{}'. Must be gemini or openai.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

/// Load `path` if it exists, otherwise return the built-in defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("pdf-query.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_match_stock_layout() {
        let cfg = Config::default();
        assert_eq!(cfg.storage.uploads_dir, PathBuf::from("uploads"));
        assert_eq!(cfg.storage.indexes_dir, PathBuf::from("indexes"));
        assert_eq!(cfg.retrieval.similarity_top_k, 2);
        assert_eq!(cfg.llm.temperature, 0.5);
        assert_eq!(cfg.llm.max_output_tokens, 256);
        assert_eq!(cfg.llm.model, "models/gemini-1.5-flash");
        assert_eq!(cfg.embedding.model, "models/embedding-001");
        assert_eq!(cfg.metadata.on_duplicate, DuplicatePolicy::Append);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[storage]
uploads_dir = "/srv/uploads"

[metadata]
on_duplicate = "replace"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.storage.uploads_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(cfg.storage.indexes_dir, PathBuf::from("indexes"));
        assert_eq!(cfg.metadata.on_duplicate, DuplicatePolicy::Replace);
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.db.path, PathBuf::from("pdf_documents.db"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[embedding]\nprovider = \"carrier-pigeon\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[retrieval]\nsimilarity_top_k = 0\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_bad_temperature() {
        let mut cfg = Config::default();
        cfg.llm.temperature = 3.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let cfg: Config =
            toml::from_str(include_str!("../config/pdf-query.example.toml")).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.max_upload_bytes, 50 * 1024 * 1024);
        assert!(cfg.server.cors_origins.is_empty());
    }
}
