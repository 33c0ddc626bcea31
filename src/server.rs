//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness check |
//! | `POST` | `/upload-pdf/` | Store a PDF and schedule background indexing |
//! | `POST` | `/ask/` | Answer a question about an uploaded PDF |
//! | `GET`  | `/status/{filename}` | Index status of an uploaded PDF |
//!
//! Every route is also reachable without the trailing slash.
//!
//! # Error Contract
//!
//! All error responses use the envelope produced by [`ApiError`]:
//!
//! ```json
//! { "error": { "code": "file_not_found", "message": "File not found: x.pdf. Upload the file first." } }
//! ```
//!
//! # CORS
//!
//! Origins listed in `[server].cors_origins` are allowed; an empty list
//! allows any origin.

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::backend::{SharedBackend, VectorIndexBackend};
use crate::config::Config;
use crate::db;
use crate::error::ApiError;
use crate::jobs::{IndexJob, IndexQueue, IndexRunner};
use crate::llm::LlmSettings;
use crate::locks::FileLocks;
use crate::metadata::MetadataStore;
use crate::migrate::apply_schema;
use crate::models::IndexStatus;
use crate::pipeline;
use crate::sanitize::{has_pdf_extension, sanitize_filename};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: MetadataStore,
    pub backend: SharedBackend,
    pub jobs: IndexQueue,
    pub locks: FileLocks,
}

/// Build the router with all routes, CORS and the upload size limit.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(handle_root))
        .route("/upload-pdf/", post(handle_upload))
        .route("/upload-pdf", post(handle_upload))
        .route("/ask/", post(handle_ask))
        .route("/ask", post(handle_ask))
        .route("/status/{filename}", get(handle_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

/// Open the metadata store, start the index runner and serve until Ctrl-C
/// or SIGTERM. The SQLite pool is closed on the way out.
pub async fn run_server(config: Config, settings: Arc<LlmSettings>) -> anyhow::Result<()> {
    let pool = db::connect(&config).await?;
    apply_schema(&pool).await?;
    let store = MetadataStore::new(pool, config.metadata.on_duplicate);

    let backend: SharedBackend = Arc::new(VectorIndexBackend::from_config(&config, settings)?);
    let locks = FileLocks::new();

    let (jobs, runner) = IndexRunner {
        store: store.clone(),
        backend: backend.clone(),
        locks: locks.clone(),
        indexes_dir: config.storage.indexes_dir.clone(),
    }
    .spawn();

    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config),
        store: store.clone(),
        backend,
        jobs,
        locks,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!(addr = %bind_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down");
    runner.abort();
    store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// ============ GET / ============

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn handle_root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Backend is live!",
    })
}

// ============ POST /upload-pdf/ ============

#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    filename: String,
}

/// Store the uploaded PDF, record it and queue indexing. Returns before the
/// index is built.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!(error = %e, "malformed multipart body");
        ApiError::InvalidFileType
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let client_name = field.file_name().unwrap_or_default().to_string();
        if !has_pdf_extension(&client_name) {
            return Err(ApiError::InvalidFileType);
        }
        let bytes = field.bytes().await.map_err(|e| {
            tracing::warn!(error = %e, "failed to read upload body");
            ApiError::InvalidFileType
        })?;
        upload = Some((client_name, bytes));
        break;
    }

    let (client_name, bytes) = upload.ok_or(ApiError::InvalidFileType)?;
    let filename = sanitize_filename(&client_name);

    if bytes.is_empty() {
        return Err(ApiError::EmptyUpload);
    }

    let uploads_dir = &state.config.storage.uploads_dir;
    tokio::fs::create_dir_all(uploads_dir)
        .await
        .map_err(|e| ApiError::StorageWrite(e.to_string()))?;
    let path = uploads_dir.join(&filename);

    {
        let _guard = state.locks.write(&filename).await;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ApiError::StorageWrite(e.to_string()))?;
    }
    tracing::info!(filename = %filename, bytes = bytes.len(), "file stored");

    let record = state
        .store
        .insert_document(&filename)
        .await
        .map_err(|e| ApiError::Metadata(format!("{:#}", e)))?;

    state
        .store
        .mark_pending(&filename, record.id)
        .await
        .map_err(|e| ApiError::Metadata(format!("{:#}", e)))?;

    state.jobs.schedule(IndexJob {
        filename: filename.clone(),
        path,
        upload_id: record.id,
    })?;

    Ok(Json(UploadResponse {
        message: "File uploaded, indexing in background",
        filename,
    }))
}

// ============ POST /ask/ ============

#[derive(Deserialize)]
struct AskRequest {
    filename: String,
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let answer = pipeline::ask(
        &state.config,
        &state.store,
        state.backend.as_ref(),
        &state.locks,
        &req.filename,
        &req.question,
    )
    .await?;

    Ok(Json(AskResponse {
        answer: answer.text,
    }))
}

// ============ GET /status/{filename} ============

#[derive(Serialize)]
struct StatusResponse {
    filename: String,
    status: IndexStatus,
    error: Option<String>,
}

async fn handle_status(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let filename = sanitize_filename(&filename);
    let record = state
        .store
        .get_status(&filename)
        .await
        .map_err(|e| ApiError::Metadata(format!("{:#}", e)))?;
    let Some(record) = record else {
        return Err(ApiError::FileNotFound(filename));
    };

    Ok(Json(StatusResponse {
        filename: record.filename,
        status: record.status,
        error: record.error,
    }))
}
