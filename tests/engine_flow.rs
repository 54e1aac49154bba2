//! End-to-end engine scenarios against mock HTTP servers.
//!
//! Covers the conversation lifecycle (log shape after successful and failed
//! sends, offline rejection), context-block assembly as seen on the wire,
//! file sync against a remote listing, and the disconnect notification edge.

use context_weaver::{
    Engine, ProbeFailure, Role, SettingsStore, SettingsUpdate, SyncFailure, WeaverError,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_engine(dir: &tempfile::TempDir) -> Engine {
    Engine::new(SettingsStore::load(dir.path().join("settings.toml")))
}

async fn mount_tags(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "llama3:latest"}, {"name": "mistral:7b"}]
        })))
        .mount(server)
        .await;
}

async fn mount_generate(server: &MockServer, response: &str) {
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": response,
            "done": true
        })))
        .mount(server)
        .await;
}

// ── Conversation lifecycle ─────────────────────────────────────

#[tokio::test]
async fn completed_sends_alternate_user_assistant() {
    let ollama = MockServer::start().await;
    mount_tags(&ollama).await;
    mount_generate(&ollama, "Here is the answer.").await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine = test_engine(&dir);
    engine
        .update_settings(SettingsUpdate {
            endpoint: Some(ollama.uri()),
            ..Default::default()
        })
        .expect("update settings");

    let status = engine.refresh_status().await;
    assert!(status.is_connected);
    assert_eq!(status.available_models, vec!["llama3:latest", "mistral:7b"]);

    engine.send_message("first question").await.expect("send 1");
    engine.send_message("second question").await.expect("send 2");

    let messages = engine.messages();
    assert_eq!(messages.len(), 4);
    for pair in messages.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        assert_eq!(pair[1].content, "Here is the answer.");
        assert!(!pair[1].is_loading);
    }
}

#[tokio::test]
async fn send_while_offline_reports_validation_and_leaves_log_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine = test_engine(&dir);

    let err = engine.send_message("hello").await.expect_err("must reject");
    assert!(matches!(err, WeaverError::Validation(_)));
    assert!(engine.messages().is_empty());
}

#[tokio::test]
async fn failed_generate_removes_placeholder_keeps_user_message() {
    let ollama = MockServer::start().await;
    mount_tags(&ollama).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&ollama)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine = test_engine(&dir);
    engine
        .update_settings(SettingsUpdate {
            endpoint: Some(ollama.uri()),
            ..Default::default()
        })
        .expect("update settings");
    engine.refresh_status().await;

    let before = engine.messages().len();
    let err = engine.send_message("hello").await.expect_err("must fail");

    match err {
        WeaverError::Server(message) => {
            assert!(message.contains("500"));
            assert!(message.contains("model crashed"));
        }
        other => panic!("expected server error, got {other:?}"),
    }
    assert_eq!(engine.messages().len(), before + 1);
    assert_eq!(engine.messages().last().map(|m| m.role), Some(Role::User));
}

#[tokio::test]
async fn ungrounded_send_proceeds_with_advisory() {
    let ollama = MockServer::start().await;
    mount_tags(&ollama).await;
    mount_generate(&ollama, "ungrounded answer").await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine = test_engine(&dir);
    engine
        .update_settings(SettingsUpdate {
            endpoint: Some(ollama.uri()),
            ..Default::default()
        })
        .expect("update settings");
    engine.refresh_status().await;
    engine.deselect_all_files();

    let outcome = engine.send_message("hello").await.expect("send");
    assert!(outcome.ungrounded);
    assert_eq!(engine.messages().len(), 2);
}

#[tokio::test]
async fn clear_chat_empties_the_log() {
    let ollama = MockServer::start().await;
    mount_tags(&ollama).await;
    mount_generate(&ollama, "ok").await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine = test_engine(&dir);
    engine
        .update_settings(SettingsUpdate {
            endpoint: Some(ollama.uri()),
            ..Default::default()
        })
        .expect("update settings");
    engine.refresh_status().await;
    engine.send_message("hello").await.expect("send");

    engine.clear_chat();
    assert!(engine.messages().is_empty());
}

// ── Context assembly on the wire ───────────────────────────────

#[tokio::test]
async fn context_block_is_assembled_from_active_files() {
    let ollama = MockServer::start().await;
    mount_tags(&ollama).await;
    mount_generate(&ollama, "cited answer").await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine = test_engine(&dir);
    engine
        .update_settings(SettingsUpdate {
            endpoint: Some(ollama.uri()),
            ..Default::default()
        })
        .expect("update settings");
    engine.refresh_status().await;

    // Replace the demo set with exactly two known files.
    let demo_ids: Vec<String> = engine.files().iter().map(|f| f.id.clone()).collect();
    for id in demo_ids {
        engine.remove_file(&id);
    }
    let a = engine.add_context_file("a.md", "/ctx/a.md", "X");
    let b = engine.add_context_file("b.md", "/ctx/b.md", "Y");
    engine.toggle_file_selection(&a);
    engine.toggle_file_selection(&b);
    assert_eq!(engine.active_context().len(), 2);

    engine.send_message("what do the docs say?").await.expect("send");

    let requests = ollama.received_requests().await.expect("recorded requests");
    let generate = requests
        .iter()
        .find(|r| r.url.path() == "/api/generate")
        .expect("generate request recorded");
    let body: serde_json::Value =
        serde_json::from_slice(&generate.body).expect("generate body is JSON");

    assert_eq!(body["prompt"], "what do the docs say?");
    assert_eq!(body["model"], "llama3:latest");
    assert_eq!(body["stream"], false);
    assert_eq!(body["options"]["num_predict"], 2048);

    let system = body["system"].as_str().expect("system is a string");
    assert!(system.contains("--- START: a.md ---\nX\n--- END: a.md ---"));
    assert!(system.contains("--- START: b.md ---\nY\n--- END: b.md ---"));
    assert!(system.contains("--- END: a.md ---\n\n--- START: b.md ---"));
    assert_eq!(system.matches("=== CONTEXT STARTS HERE ===").count(), 1);
    assert_eq!(system.matches("=== CONTEXT ENDS HERE ===").count(), 1);
}

#[tokio::test]
async fn ungrounded_system_prompt_has_no_context_markers() {
    let ollama = MockServer::start().await;
    mount_tags(&ollama).await;
    mount_generate(&ollama, "plain answer").await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine = test_engine(&dir);
    engine
        .update_settings(SettingsUpdate {
            endpoint: Some(ollama.uri()),
            ..Default::default()
        })
        .expect("update settings");
    engine.refresh_status().await;
    engine.deselect_all_files();

    engine.send_message("hello").await.expect("send");

    let requests = ollama.received_requests().await.expect("recorded requests");
    let generate = requests
        .iter()
        .find(|r| r.url.path() == "/api/generate")
        .expect("generate request recorded");
    let body: serde_json::Value =
        serde_json::from_slice(&generate.body).expect("generate body is JSON");
    let system = body["system"].as_str().expect("system is a string");
    assert!(!system.contains("CONTEXT STARTS HERE"));
}

// ── File sync ──────────────────────────────────────────────────

#[tokio::test]
async fn sync_replaces_set_from_remote_listing() {
    let files_api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                {
                    "name": "handbook.md",
                    "path": "/ctx/handbook.md",
                    "size": 512,
                    "type": "markdown",
                    "lastModified": "2026-08-20T10:00:00.000Z"
                },
                {
                    "name": "config.json",
                    "path": "/ctx/config.json",
                    "size": 128,
                    "type": "json",
                    "lastModified": "2026-08-21T11:30:00.000Z"
                }
            ]
        })))
        .mount(&files_api)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine = test_engine(&dir);
    engine
        .update_settings(SettingsUpdate {
            files_api_path: Some(format!("{}/api/files", files_api.uri())),
            ..Default::default()
        })
        .expect("update settings");

    engine.sync_files().await;

    assert!(!engine.is_using_demo_files());
    assert!(engine.last_sync_error().is_none());
    let files = engine.files();
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| !f.is_selected));
    assert!(files.iter().all(|f| f.content.is_none()));
    assert_eq!(files[0].name, "handbook.md");
    assert_eq!(files[0].id, "server-0-handbook.md");
    // Nothing loaded yet, so nothing is active.
    assert!(engine.active_context().is_empty());
}

#[tokio::test]
async fn sync_server_error_falls_back_to_demo_set() {
    let files_api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&files_api)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine = test_engine(&dir);
    engine
        .update_settings(SettingsUpdate {
            files_api_path: Some(format!("{}/api/files", files_api.uri())),
            ..Default::default()
        })
        .expect("update settings");

    engine.sync_files().await;

    assert!(engine.is_using_demo_files());
    assert_eq!(engine.files().len(), 3);
    match engine.last_sync_error() {
        Some(SyncFailure::Failed { message }) => assert!(message.contains("503")),
        other => panic!("expected classified failure, got {other:?}"),
    }
}

// ── Disconnect notification ────────────────────────────────────

#[tokio::test]
async fn disconnect_fires_exactly_once_per_transition() {
    let ollama = MockServer::start().await;
    // First probe succeeds, every later probe gets an unmatched 404.
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "llama3:latest"}]
        })))
        .up_to_n_times(1)
        .mount(&ollama)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine = test_engine(&dir);
    engine
        .update_settings(SettingsUpdate {
            endpoint: Some(ollama.uri()),
            ..Default::default()
        })
        .expect("update settings");

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    engine.set_on_disconnect(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let status = engine.refresh_status().await;
    assert!(status.is_connected);

    let status = engine.refresh_status().await;
    assert!(!status.is_connected);
    assert!(matches!(status.error, Some(ProbeFailure::Server { .. })));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // A second consecutive disconnected probe does not re-trigger.
    engine.refresh_status().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
