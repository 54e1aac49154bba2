//! File-serving backend.
//!
//! Minimal HTTP server over a configured root directory of context
//! documents. Exposes the listing, content, and health endpoints the
//! registry consumes:
//!
//! - `GET /api/files`: list regular files in the root
//! - `GET /api/files/{name}`: file content (403 on path traversal)
//! - `GET /api/health`: liveness/diagnostic payload

use crate::registry::FileKind;
use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One entry in the listing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "lastModified")]
    pub last_modified: String,
}

/// Response from `GET /api/files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<FileEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response from `GET /api/files/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContentResponse {
    pub name: String,
    pub content: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "lastModified")]
    pub last_modified: String,
}

/// Response from `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    #[serde(rename = "contextDir")]
    pub context_dir: String,
    #[serde(rename = "contextDirExists")]
    pub context_dir_exists: bool,
}

/// JSON error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Clone)]
struct AppState {
    /// Root directory containing the context documents.
    root: PathBuf,
}

/// Build the backend router over a root directory.
#[must_use]
pub fn router(root: PathBuf) -> Router {
    let state = AppState { root };
    Router::new()
        .route("/api/files", get(handle_list))
        .route("/api/files/{filename}", get(handle_content))
        .route("/api/health", get(handle_health))
        .with_state(state)
}

/// Running file-serving backend.
pub struct FileServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl FileServer {
    /// Bind `addr` (port 0 auto-assigns) and serve in a background task.
    pub async fn start(root: PathBuf, addr: SocketAddr) -> crate::error::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        info!(%addr, root = %root.display(), "file backend listening");

        let app = router(root);
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!("file backend exited: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// The address the server is listening on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop serving.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_list(State(state): State<AppState>) -> Response {
    let root = state.root.clone();

    let mut dir = match tokio::fs::read_dir(&root).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(root = %root.display(), "context directory not found");
            return Json(FileListResponse {
                files: Vec::new(),
                message: Some("Context directory not found".to_owned()),
            })
            .into_response();
        }
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list files",
                Some(e.to_string()),
            );
        }
    };

    let mut files = Vec::new();
    loop {
        match dir.next_entry().await {
            Ok(Some(entry)) => {
                let Ok(meta) = entry.metadata().await else {
                    continue;
                };
                if !meta.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                files.push(FileEntry {
                    kind: FileKind::from_name(&name).as_str().to_owned(),
                    path: entry.path().to_string_lossy().into_owned(),
                    size: meta.len(),
                    last_modified: modified_iso(&meta),
                    name,
                });
            }
            Ok(None) => break,
            Err(e) => {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to list files",
                    Some(e.to_string()),
                );
            }
        }
    }

    info!(count = files.len(), root = %root.display(), "listed context files");
    Json(FileListResponse {
        files,
        message: None,
    })
    .into_response()
}

async fn handle_content(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Response {
    // Reject parent/absolute components before touching the filesystem so a
    // traversal attempt never distinguishes existing from missing targets.
    if !is_plain_name(&filename) {
        return error_response(StatusCode::FORBIDDEN, "Access denied", None);
    }

    let candidate = state.root.join(&filename);

    // Symlinks can still escape the root; compare canonicalized paths.
    let root = match tokio::fs::canonicalize(&state.root).await {
        Ok(root) => root,
        Err(_) => return error_response(StatusCode::NOT_FOUND, "File not found", None),
    };
    let resolved = match tokio::fs::canonicalize(&candidate).await {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return error_response(StatusCode::NOT_FOUND, "File not found", None);
        }
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read file",
                Some(e.to_string()),
            );
        }
    };
    if !resolved.starts_with(&root) {
        return error_response(StatusCode::FORBIDDEN, "Access denied", None);
    }

    let meta = match tokio::fs::metadata(&resolved).await {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return error_response(StatusCode::NOT_FOUND, "File not found", None),
        Err(_) => return error_response(StatusCode::NOT_FOUND, "File not found", None),
    };

    match tokio::fs::read_to_string(&resolved).await {
        Ok(content) => Json(FileContentResponse {
            kind: FileKind::from_name(&filename).as_str().to_owned(),
            content,
            size: meta.len(),
            last_modified: modified_iso(&meta),
            name: filename,
        })
        .into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read file",
            Some(e.to_string()),
        ),
    }
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let exists = tokio::fs::metadata(&state.root).await.is_ok();
    Json(HealthResponse {
        status: "ok".to_owned(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        context_dir: state.root.to_string_lossy().into_owned(),
        context_dir_exists: exists,
    })
}

/// True when the name is a single normal path component.
fn is_plain_name(name: &str) -> bool {
    let path = Path::new(name);
    let mut components = path.components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn modified_iso(meta: &std::fs::Metadata) -> String {
    meta.modified()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|_| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn error_response(status: StatusCode, error: &str, details: Option<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_owned(),
            details,
        }),
    )
        .into_response()
}
