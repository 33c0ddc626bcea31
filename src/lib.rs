//! # pdf-query
//!
//! Upload PDFs, index them in the background and answer questions about them
//! with retrieval-augmented generation.
//!
//! ## Architecture
//!
//! ```text
//! upload ──▶ uploads/<name> ──▶ job queue ──▶ extract → chunk → embed ──▶ indexes/<name>/
//!   │                                                                         │
//!   └──▶ SQLite (pdf_documents, index_status)         ask ──▶ load → top-k → LLM
//! ```
//!
//! Everything is keyed by the sanitized filename: the raw upload, its
//! metadata rows, its index status and its index directory.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`sanitize`] | Filename sanitization |
//! | [`models`] | Core data types |
//! | [`error`] | API and pipeline errors |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`metadata`] | Upload log and index status |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Completion clients and prompt template |
//! | [`index`] | Persisted vector index |
//! | [`backend`] | Index backend capability |
//! | [`pipeline`] | Indexing and ask flows |
//! | [`jobs`] | Background indexing queue |
//! | [`locks`] | Per-document locks |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI commands |
//! | [`logging`] | Tracing setup |

pub mod backend;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod jobs;
pub mod llm;
pub mod locks;
pub mod logging;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod sanitize;
pub mod server;
