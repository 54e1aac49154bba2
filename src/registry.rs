//! Context-document registry.
//!
//! Maintains the list of known context files, their selection state, and
//! lazily-loaded content. The set is synchronized from a remote listing
//! endpoint; when that fails the registry falls back to the built-in demo
//! set and records a classified reason. Only files that are both selected
//! and content-loaded contribute to context assembly.

use crate::demo::{DemoFiles, FallbackSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Deadline for the file-listing sync request.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a single content fetch.
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Document category derived from the filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Markdown,
    Json,
    Text,
    Javascript,
    Typescript,
    Python,
    Html,
    Css,
}

impl FileKind {
    /// Classify a filename by its extension; unknown extensions are text.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "md" => Self::Markdown,
            "json" => Self::Json,
            "js" | "jsx" => Self::Javascript,
            "ts" | "tsx" => Self::Typescript,
            "py" => Self::Python,
            "html" => Self::Html,
            "css" => Self::Css,
            _ => Self::Text,
        }
    }

    /// Wire name used by the file-listing API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Text => "text",
            Self::Javascript => "javascript",
            Self::Typescript => "typescript",
            Self::Python => "python",
            Self::Html => "html",
            Self::Css => "css",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A context document known to the registry.
///
/// `content` is absent until explicitly loaded; a selected file without
/// content is silently excluded from context assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextFile {
    pub id: String,
    pub name: String,
    pub path: String,
    pub size: u64,
    pub kind: FileKind,
    pub content: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub is_loading: bool,
    pub is_selected: bool,
}

/// Classified reason a sync failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SyncFailure {
    /// The listing request exceeded its deadline.
    Timeout,
    /// The request never reached the network layer.
    Network,
    /// The server answered with a non-success status or another error.
    Failed {
        /// Raw message.
        message: String,
    },
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Network => write!(f, "network_error"),
            Self::Failed { message } => write!(f, "{message}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    files: Vec<RemoteFileEntry>,
}

#[derive(Debug, Deserialize)]
struct RemoteFileEntry {
    name: String,
    path: String,
    size: u64,
    #[serde(rename = "lastModified")]
    last_modified: String,
}

#[derive(Debug, Deserialize)]
struct FileContentResponse {
    content: String,
}

/// Registry of context documents and their selection state.
pub struct FileRegistry {
    client: reqwest::Client,
    files_api_path: String,
    files: Vec<ContextFile>,
    /// Id of the file currently shown in the preview pane, if any.
    preview: Option<String>,
    last_error: Option<SyncFailure>,
    using_demo_files: bool,
    is_syncing: bool,
    fallback: Box<dyn FallbackSource>,
}

impl FileRegistry {
    /// Create a registry seeded with the demo fallback set.
    #[must_use]
    pub fn new(files_api_path: impl Into<String>) -> Self {
        Self::with_fallback(files_api_path, Box::new(DemoFiles))
    }

    /// Create a registry with a custom fallback source.
    #[must_use]
    pub fn with_fallback(
        files_api_path: impl Into<String>,
        fallback: Box<dyn FallbackSource>,
    ) -> Self {
        let files = fallback.files();
        Self {
            client: reqwest::Client::new(),
            files_api_path: files_api_path.into(),
            files,
            preview: None,
            last_error: None,
            using_demo_files: true,
            is_syncing: false,
            fallback,
        }
    }

    /// Point the registry at a different listing endpoint (settings change).
    pub fn set_files_api_path(&mut self, files_api_path: impl Into<String>) {
        self.files_api_path = files_api_path.into();
    }

    /// All known files, in listing order.
    #[must_use]
    pub fn files(&self) -> &[ContextFile] {
        &self.files
    }

    /// The file currently shown in the preview pane.
    #[must_use]
    pub fn preview_file(&self) -> Option<&ContextFile> {
        let id = self.preview.as_deref()?;
        self.files.iter().find(|f| f.id == id)
    }

    /// Classified reason the last sync failed, if it did.
    #[must_use]
    pub fn last_error(&self) -> Option<&SyncFailure> {
        self.last_error.as_ref()
    }

    /// Whether the current set is the built-in fallback.
    #[must_use]
    pub fn is_using_demo_files(&self) -> bool {
        self.using_demo_files
    }

    /// Whether a sync is currently in flight.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.is_syncing
    }

    /// Number of selected files (with or without loaded content).
    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_selected).count()
    }

    /// Files that contribute to context assembly: selected and content-loaded.
    #[must_use]
    pub fn active_context(&self) -> Vec<ContextFile> {
        self.files
            .iter()
            .filter(|f| f.is_selected && f.content.as_deref().is_some_and(|c| !c.is_empty()))
            .cloned()
            .collect()
    }

    /// Fetch the remote listing and replace the file set.
    ///
    /// Every entry arrives unselected with content unloaded. On failure the
    /// set is replaced by the fallback files (fresh timestamps) and a
    /// classified reason is recorded; nothing propagates past this boundary.
    pub async fn sync(&mut self) {
        self.is_syncing = true;
        self.last_error = None;

        let result = self
            .client
            .get(&self.files_api_path)
            .timeout(SYNC_TIMEOUT)
            .send()
            .await;

        let failure = match result {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<FileListResponse>().await {
                    Ok(listing) => {
                        self.files = listing
                            .files
                            .into_iter()
                            .enumerate()
                            .map(|(index, entry)| ContextFile {
                                id: format!("server-{index}-{}", entry.name),
                                kind: FileKind::from_name(&entry.name),
                                last_modified: DateTime::parse_from_rfc3339(&entry.last_modified)
                                    .map(|dt| dt.with_timezone(&Utc))
                                    .unwrap_or_else(|_| Utc::now()),
                                name: entry.name,
                                path: entry.path,
                                size: entry.size,
                                content: None,
                                is_loading: false,
                                is_selected: false,
                            })
                            .collect();
                        self.using_demo_files = false;
                        None
                    }
                    Err(e) => Some(SyncFailure::Failed {
                        message: format!("invalid file listing: {e}"),
                    }),
                }
            }
            Ok(resp) => Some(SyncFailure::Failed {
                message: format!("Server responded with {}", resp.status().as_u16()),
            }),
            Err(e) if e.is_timeout() => Some(SyncFailure::Timeout),
            Err(e) if e.is_connect() || e.is_request() => Some(SyncFailure::Network),
            Err(e) => Some(SyncFailure::Failed {
                message: e.to_string(),
            }),
        };

        if let Some(failure) = failure {
            warn!(%failure, "file sync failed, falling back to demo files");
            self.last_error = Some(failure);
            self.using_demo_files = true;
            self.files = self.fallback.files();
        }

        self.is_syncing = false;
    }

    /// Load a file's content and make it the preview target.
    ///
    /// Content already resident (demo files) is not re-fetched. A failed
    /// fetch still surfaces the file as the preview target, with content
    /// unavailable. The loading flag is always cleared on completion.
    pub async fn load_content(&mut self, file_id: &str) {
        let Some(index) = self.files.iter().position(|f| f.id == file_id) else {
            return;
        };
        self.files[index].is_loading = true;

        if self.files[index].content.is_some() {
            self.files[index].is_loading = false;
            self.preview = Some(file_id.to_owned());
            return;
        }

        let url = format!(
            "{}/{}",
            self.files_api_path.trim_end_matches('/'),
            urlencoding::encode(&self.files[index].name)
        );

        let content = match self.client.get(&url).timeout(LOAD_TIMEOUT).send().await {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<FileContentResponse>().await {
                    Ok(body) => Some(body.content),
                    Err(e) => {
                        warn!("invalid file content payload: {e}");
                        None
                    }
                }
            }
            Ok(resp) => {
                warn!("failed to load file content: status {}", resp.status());
                None
            }
            Err(e) => {
                warn!("failed to load file content: {e}");
                None
            }
        };

        let file = &mut self.files[index];
        file.is_loading = false;
        if content.is_some() {
            file.content = content;
        }
        self.preview = Some(file_id.to_owned());
    }

    /// Flip one file's selection flag.
    pub fn toggle_selection(&mut self, file_id: &str) {
        if let Some(file) = self.files.iter_mut().find(|f| f.id == file_id) {
            file.is_selected = !file.is_selected;
        }
    }

    /// Select every file.
    pub fn select_all(&mut self) {
        for file in &mut self.files {
            file.is_selected = true;
        }
    }

    /// Deselect every file.
    pub fn deselect_all(&mut self) {
        for file in &mut self.files {
            file.is_selected = false;
        }
    }

    /// Manually add a file with a fresh id; returns the id.
    pub fn add_file(
        &mut self,
        name: impl Into<String>,
        path: impl Into<String>,
        size: u64,
        content: Option<String>,
    ) -> String {
        let name = name.into();
        let id = Uuid::new_v4().to_string();
        self.files.push(ContextFile {
            id: id.clone(),
            kind: FileKind::from_name(&name),
            name,
            path: path.into(),
            size,
            content,
            last_modified: Utc::now(),
            is_loading: false,
            is_selected: false,
        });
        id
    }

    /// Remove a file; clears the preview if it pointed at the entry.
    pub fn remove(&mut self, file_id: &str) {
        self.files.retain(|f| f.id != file_id);
        if self.preview.as_deref() == Some(file_id) {
            self.preview = None;
        }
    }
}
