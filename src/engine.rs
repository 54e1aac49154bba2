//! Engine facade for the UI layer.
//!
//! Owns the settings store, file registry, connection monitor, and
//! conversation controller, and exposes the imperative entry points a
//! frontend consumes. Components keep disjoint state (the controller owns
//! the log, the registry owns files and selection, the monitor is the sole
//! status writer); the engine only wires reads across them per send.

use crate::chat::{ChatController, Message, SendOutcome};
use crate::error::Result;
use crate::monitor::{ConnectionMonitor, DisconnectHandler, ServerStatus};
use crate::registry::{ContextFile, FileRegistry, SyncFailure};
use crate::settings::{ServerSettings, SettingsStore, SettingsUpdate};
use tokio::task::JoinHandle;

/// Conversation engine: the core exposed to the UI layer.
pub struct Engine {
    store: SettingsStore,
    registry: FileRegistry,
    monitor: ConnectionMonitor,
    chat: ChatController,
}

impl Engine {
    /// Build an engine around a loaded settings store.
    #[must_use]
    pub fn new(store: SettingsStore) -> Self {
        let settings = store.settings().clone();
        Self {
            registry: FileRegistry::new(settings.files_api_path.clone()),
            monitor: ConnectionMonitor::new(settings.endpoint.clone()),
            chat: ChatController::new(),
            store,
        }
    }

    // ── Conversation ───────────────────────────────────────────

    /// Send one user message, grounding it in the active context.
    ///
    /// Validation, context assembly, and settlement follow the controller's
    /// state machine; the engine supplies the current status snapshot and
    /// the selected, content-loaded files.
    pub async fn send_message(&mut self, text: &str) -> Result<SendOutcome> {
        let status = self.monitor.status();
        let context = self.registry.active_context();
        self.chat
            .send(text, &status, &context, self.store.settings())
            .await
    }

    /// The ordered message log (read-only).
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.chat.messages()
    }

    /// Empty the message log.
    pub fn clear_chat(&mut self) {
        self.chat.clear();
    }

    // ── Connection ─────────────────────────────────────────────

    /// Current server status snapshot.
    #[must_use]
    pub fn server_status(&self) -> ServerStatus {
        self.monitor.status()
    }

    /// Manually refresh the server status with one probe.
    pub async fn refresh_status(&self) -> ServerStatus {
        self.monitor.probe().await
    }

    /// Start the periodic probe loop (immediate first probe, then every 30 s).
    #[must_use]
    pub fn start_monitoring(&self) -> JoinHandle<()> {
        self.monitor.spawn_loop()
    }

    /// Register the single disconnect handler.
    pub fn set_on_disconnect(&self, handler: DisconnectHandler) {
        self.monitor.set_on_disconnect(handler);
    }

    // ── Context files ──────────────────────────────────────────

    /// Synchronize the file set from the listing endpoint.
    pub async fn sync_files(&mut self) {
        self.registry.sync().await;
    }

    /// Load a file's content and make it the preview target.
    pub async fn load_file_content(&mut self, file_id: &str) {
        self.registry.load_content(file_id).await;
    }

    /// All known context files.
    #[must_use]
    pub fn files(&self) -> &[ContextFile] {
        self.registry.files()
    }

    /// Files contributing to context assembly.
    #[must_use]
    pub fn active_context(&self) -> Vec<ContextFile> {
        self.registry.active_context()
    }

    /// The current preview file, if any.
    #[must_use]
    pub fn preview_file(&self) -> Option<&ContextFile> {
        self.registry.preview_file()
    }

    /// Number of selected files.
    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.registry.selected_count()
    }

    /// Whether the registry is showing the demo fallback set.
    #[must_use]
    pub fn is_using_demo_files(&self) -> bool {
        self.registry.is_using_demo_files()
    }

    /// Classified reason the last sync failed, if it did.
    #[must_use]
    pub fn last_sync_error(&self) -> Option<&SyncFailure> {
        self.registry.last_error()
    }

    /// Manually add a content-loaded context file; returns its id.
    ///
    /// Manual adds arrive unselected, like synced entries.
    pub fn add_context_file(
        &mut self,
        name: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> String {
        let content = content.into();
        let size = content.len() as u64;
        self.registry.add_file(name, path, size, Some(content))
    }

    /// Flip one file's selection flag.
    pub fn toggle_file_selection(&mut self, file_id: &str) {
        self.registry.toggle_selection(file_id);
    }

    /// Select every file.
    pub fn select_all_files(&mut self) {
        self.registry.select_all();
    }

    /// Deselect every file.
    pub fn deselect_all_files(&mut self) {
        self.registry.deselect_all();
    }

    /// Remove a file from the registry.
    pub fn remove_file(&mut self, file_id: &str) {
        self.registry.remove(file_id);
    }

    // ── Settings ───────────────────────────────────────────────

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> &ServerSettings {
        self.store.settings()
    }

    /// Apply a partial settings update, persist it, and re-point the
    /// monitor and registry at the new endpoints.
    pub fn update_settings(&mut self, update: SettingsUpdate) -> Result<()> {
        self.store.update(update)?;
        self.repoint();
        Ok(())
    }

    /// Restore default settings and persist them.
    pub fn reset_settings(&mut self) -> Result<()> {
        self.store.reset()?;
        self.repoint();
        Ok(())
    }

    fn repoint(&mut self) {
        let settings = self.store.settings();
        self.monitor.set_endpoint(settings.endpoint.clone());
        self.registry
            .set_files_api_path(settings.files_api_path.clone());
    }
}
