//! Persisted connection settings.
//!
//! A single settings record (inference endpoint, file-listing path, model,
//! sampling knobs) lives in one TOML file. Loading merges the persisted
//! values over hard-coded defaults so fields introduced after a record was
//! written fall back safely. Every mutation persists immediately with an
//! atomic write (temp file → fsync → rename).

use crate::error::{Result, WeaverError};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default Ollama endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434";
/// Default file-listing API path.
pub const DEFAULT_FILES_API_PATH: &str = "/api/files";
/// Default model name.
pub const DEFAULT_MODEL: &str = "llama3:latest";
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.2;
/// Default nucleus sampling threshold.
pub const DEFAULT_TOP_P: f64 = 0.9;

/// Connection settings for the inference server and file-listing backend.
///
/// Out-of-range numeric values are accepted as-is; the store performs no
/// validation beyond what input widgets enforce upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Base URL of the Ollama-compatible inference server.
    pub endpoint: String,
    /// Base URL or path of the file-listing API.
    pub files_api_path: String,
    /// Model name passed to the generate call.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling threshold.
    pub top_p: f64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            files_api_path: DEFAULT_FILES_API_PATH.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }
}

/// Partial settings mutation; unset fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub endpoint: Option<String>,
    pub files_api_path: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

impl ServerSettings {
    /// Shallow-merge an update over this record.
    fn apply(&mut self, update: SettingsUpdate) {
        if let Some(endpoint) = update.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(files_api_path) = update.files_api_path {
            self.files_api_path = files_api_path;
        }
        if let Some(model) = update.model {
            self.model = model;
        }
        if let Some(temperature) = update.temperature {
            self.temperature = temperature;
        }
        if let Some(top_p) = update.top_p {
            self.top_p = top_p;
        }
    }
}

/// Persisted-record shape: every field optional so that records written by
/// older versions merge cleanly over current defaults.
#[derive(Debug, Default, Deserialize)]
struct StoredSettings {
    endpoint: Option<String>,
    files_api_path: Option<String>,
    model: Option<String>,
    temperature: Option<f64>,
    top_p: Option<f64>,
}

impl From<StoredSettings> for SettingsUpdate {
    fn from(stored: StoredSettings) -> Self {
        Self {
            endpoint: stored.endpoint,
            files_api_path: stored.files_api_path,
            model: stored.model,
            temperature: stored.temperature,
            top_p: stored.top_p,
        }
    }
}

/// Settings store with explicit load/persist lifecycle.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: ServerSettings,
}

impl SettingsStore {
    /// Returns the default on-disk location for the settings record.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("context-weaver")
            .join("settings.toml")
    }

    /// Load settings from `path`, merging persisted values over defaults.
    ///
    /// A missing, unreadable, or unparsable file degrades to defaults with a
    /// warning; it is never an error.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut settings = ServerSettings::default();

        match std::fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str::<StoredSettings>(&raw) {
                Ok(stored) => settings.apply(stored.into()),
                Err(e) => {
                    warn!("ignoring unparsable settings file {}: {e}", path.display());
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("failed to read settings file {}: {e}", path.display());
            }
        }

        Self { path, settings }
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Apply a partial update and persist the result.
    pub fn update(&mut self, update: SettingsUpdate) -> Result<()> {
        self.settings.apply(update);
        self.persist()
    }

    /// Restore defaults and persist them.
    pub fn reset(&mut self) -> Result<()> {
        self.settings = ServerSettings::default();
        self.persist()
    }

    /// Write the current record atomically (temp file → fsync → rename).
    pub fn persist(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(&self.settings)
            .map_err(|e| WeaverError::Config(format!("failed to serialize settings: {e}")))?;
        write_text_atomic(&self.path, &toml_str)
    }
}

fn write_text_atomic(path: &Path, text: &str) -> Result<()> {
    let tmp_path = path.with_extension("toml.tmp");

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            WeaverError::Config(format!(
                "failed to create settings directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
        WeaverError::Config(format!(
            "failed to create temp file '{}': {e}",
            tmp_path.display()
        ))
    })?;

    file.write_all(text.as_bytes())
        .map_err(|e| WeaverError::Config(format!("failed to write temp file: {e}")))?;

    file.sync_all()
        .map_err(|e| WeaverError::Config(format!("failed to sync temp file: {e}")))?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        WeaverError::Config(format!(
            "failed to rename '{}' to '{}': {e}",
            tmp_path.display(),
            path.display()
        ))
    })
}
