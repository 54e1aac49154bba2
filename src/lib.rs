//! Context-weaver: a context-aware conversation core for Ollama-backed
//! document chat, paired with a minimal file-serving backend.
//!
//! # Architecture
//!
//! Four components with disjoint state, wired by the [`Engine`] facade:
//! - **Settings store**: persisted connection configuration
//! - **File registry**: context documents, selection, lazy content
//! - **Connection monitor**: periodic health probing with a one-shot
//!   disconnect notification
//! - **Conversation controller**: the message log and the per-send state
//!   machine (validate → await → settle)
//!
//! The accompanying [`backend`] module serves context documents over HTTP
//! for the registry to sync from.

pub mod backend;
pub mod chat;
pub mod demo;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod ollama;
pub mod registry;
pub mod settings;

pub use chat::{ChatController, Message, Role, SendOutcome};
pub use engine::Engine;
pub use error::{Result, WeaverError};
pub use monitor::{ConnectionMonitor, ProbeFailure, ServerStatus};
pub use registry::{ContextFile, FileKind, FileRegistry, SyncFailure};
pub use settings::{ServerSettings, SettingsStore, SettingsUpdate};
