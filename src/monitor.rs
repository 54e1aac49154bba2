//! Inference-server connection monitor.
//!
//! Probes the Ollama-compatible endpoint's `/api/tags` route on a fixed
//! interval (plus once at startup and on manual refresh), maintains a
//! [`ServerStatus`] with a classified failure reason, and fires a single
//! registered disconnect handler exactly when a previously-connected server
//! goes offline.
//!
//! Probes may overlap; each one carries a monotonically increasing token and
//! a result is discarded if a newer probe has already been applied, so an
//! out-of-order completion can never roll status backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Deadline for a single health probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(8);

/// Interval between scheduled probes.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Classified reason a probe failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ProbeFailure {
    /// The probe exceeded its deadline.
    Timeout,
    /// The request never reached the network layer (refused connection,
    /// DNS failure, policy rejection).
    Network,
    /// The server answered with a non-success status or another error;
    /// carries the raw message.
    Server {
        /// Raw server-reported message.
        message: String,
    },
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Network => write!(f, "cors_or_network"),
            Self::Server { message } => write!(f, "{message}"),
        }
    }
}

/// Current view of the inference server's health.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Whether the last applied probe reached the server successfully.
    pub is_connected: bool,
    /// Whether a probe is currently in flight.
    pub is_checking: bool,
    /// When the last probe settled, if any has.
    pub last_checked: Option<DateTime<Utc>>,
    /// Classified failure of the last applied probe, if it failed.
    pub error: Option<ProbeFailure>,
    /// Model names advertised by the server on the last successful probe.
    pub available_models: Vec<String>,
}

/// Result of one settled probe, before it is applied to shared status.
enum ProbeOutcome {
    Connected(Vec<String>),
    Failed(ProbeFailure),
}

/// Handler invoked on the connected→disconnected transition.
pub type DisconnectHandler = Box<dyn Fn() + Send + Sync + 'static>;

struct MonitorInner {
    client: reqwest::Client,
    endpoint: RwLock<String>,
    status: RwLock<ServerStatus>,
    /// Whether the server was connected as of the last applied probe.
    was_connected: AtomicBool,
    /// Token handed to the next probe.
    probe_seq: AtomicU64,
    /// Token of the newest probe whose result has been applied.
    applied_seq: AtomicU64,
    on_disconnect: Mutex<Option<DisconnectHandler>>,
}

/// Health monitor for the inference server.
///
/// Cheap to clone; all clones share the same status and handler.
#[derive(Clone)]
pub struct ConnectionMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectionMonitor {
    /// Create a monitor for the given endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                client: reqwest::Client::new(),
                endpoint: RwLock::new(endpoint.into()),
                status: RwLock::new(ServerStatus::default()),
                was_connected: AtomicBool::new(false),
                probe_seq: AtomicU64::new(0),
                applied_seq: AtomicU64::new(0),
                on_disconnect: Mutex::new(None),
            }),
        }
    }

    /// Point the monitor at a different endpoint (settings change).
    pub fn set_endpoint(&self, endpoint: impl Into<String>) {
        if let Ok(mut guard) = self.inner.endpoint.write() {
            *guard = endpoint.into();
        }
    }

    /// Register the disconnect handler, replacing any previous one.
    ///
    /// Only one handler is supported at a time. It fires exactly once per
    /// connected→disconnected transition and never on a first failing probe.
    pub fn set_on_disconnect(&self, handler: DisconnectHandler) {
        if let Ok(mut guard) = self.inner.on_disconnect.lock() {
            *guard = Some(handler);
        }
    }

    /// Snapshot of the current status.
    #[must_use]
    pub fn status(&self) -> ServerStatus {
        self.inner
            .status
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Issue one health probe and return the status after it settles.
    ///
    /// The probe is a bounded `GET {endpoint}/api/tags`. Stale results
    /// (settling after a newer probe has been applied) are discarded and the
    /// current status is returned unchanged.
    pub async fn probe(&self) -> ServerStatus {
        let token = self.inner.probe_seq.fetch_add(1, Ordering::SeqCst) + 1;

        if let Ok(mut status) = self.inner.status.write() {
            status.is_checking = true;
            status.error = None;
        }

        let endpoint = self
            .inner
            .endpoint
            .read()
            .map(|e| e.clone())
            .unwrap_or_default();
        let url = format!("{}/api/tags", endpoint.trim_end_matches('/'));

        let outcome = match self.inner.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(resp) if resp.status().is_success() => {
                let body = resp.text().await.unwrap_or_default();
                ProbeOutcome::Connected(parse_tags_response(&body))
            }
            Ok(resp) => ProbeOutcome::Failed(ProbeFailure::Server {
                message: format!("Server responded with status {}", resp.status().as_u16()),
            }),
            Err(e) => ProbeOutcome::Failed(classify_probe_error(&e)),
        };

        self.apply(token, outcome)
    }

    /// Spawn the periodic probe loop: one probe immediately, then one every
    /// [`PROBE_INTERVAL`]. Abort the returned handle to stop the loop.
    #[must_use]
    pub fn spawn_loop(&self) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PROBE_INTERVAL);
            loop {
                ticker.tick().await;
                let status = monitor.probe().await;
                debug!(
                    connected = status.is_connected,
                    models = status.available_models.len(),
                    "scheduled probe settled"
                );
            }
        })
    }

    /// Apply a settled probe result unless a newer one already landed.
    fn apply(&self, token: u64, outcome: ProbeOutcome) -> ServerStatus {
        let (snapshot, fire_disconnect) = {
            let Ok(mut status) = self.inner.status.write() else {
                return ServerStatus::default();
            };

            // Last-applied wins; discard results that settled out of order.
            let applied = self.inner.applied_seq.load(Ordering::SeqCst);
            if token <= applied {
                debug!(token, applied, "discarding stale probe result");
                return status.clone();
            }
            self.inner.applied_seq.store(token, Ordering::SeqCst);

            let now = Utc::now();
            match outcome {
                ProbeOutcome::Connected(models) => {
                    status.is_connected = true;
                    status.is_checking = false;
                    status.last_checked = Some(now);
                    status.available_models = models;
                    status.error = None;
                }
                ProbeOutcome::Failed(failure) => {
                    warn!(%failure, "health probe failed");
                    status.is_connected = false;
                    status.is_checking = false;
                    status.last_checked = Some(now);
                    status.error = Some(failure);
                }
            }

            let was = self
                .inner
                .was_connected
                .swap(status.is_connected, Ordering::SeqCst);

            (status.clone(), was && !status.is_connected)
        };

        if fire_disconnect
            && let Ok(guard) = self.inner.on_disconnect.lock()
            && let Some(handler) = guard.as_ref()
        {
            handler();
        }

        snapshot
    }
}

/// Classify a `reqwest` probe failure.
fn classify_probe_error(err: &reqwest::Error) -> ProbeFailure {
    if err.is_timeout() {
        ProbeFailure::Timeout
    } else if err.is_connect() || err.is_request() {
        ProbeFailure::Network
    } else {
        ProbeFailure::Server {
            message: err.to_string(),
        }
    }
}

/// Parse an Ollama `/api/tags` response into model names.
///
/// Expected format: `{"models": [{"name": "llama3:8b", ...}, ...]}`.
/// A malformed payload yields an empty list rather than a failure.
fn parse_tags_response(body: &str) -> Vec<String> {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return Vec::new();
    };
    json.get("models")
        .and_then(|m| m.as_array())
        .map(|models| {
            models
                .iter()
                .filter_map(|entry| entry.get("name")?.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn status_starts_idle() {
        let monitor = ConnectionMonitor::new("http://localhost:11434");
        let status = monitor.status();
        assert!(!status.is_connected);
        assert!(!status.is_checking);
        assert!(status.last_checked.is_none());
        assert!(status.error.is_none());
        assert!(status.available_models.is_empty());
    }

    #[test]
    fn parse_tags_valid() {
        let body = r#"{"models":[{"name":"llama3:8b","size":1},{"name":"mistral:7b"}]}"#;
        assert_eq!(parse_tags_response(body), vec!["llama3:8b", "mistral:7b"]);
    }

    #[test]
    fn parse_tags_malformed_is_empty() {
        assert!(parse_tags_response("not json").is_empty());
        assert!(parse_tags_response(r#"{"data":[]}"#).is_empty());
    }

    #[test]
    fn stale_probe_result_is_discarded() {
        let monitor = ConnectionMonitor::new("http://localhost:11434");

        // Newer probe (token 2) settles first.
        monitor.apply(2, ProbeOutcome::Connected(vec!["llama3:8b".to_owned()]));
        // Older probe (token 1) settles afterwards and must not win.
        let status = monitor.apply(1, ProbeOutcome::Failed(ProbeFailure::Timeout));

        assert!(status.is_connected);
        assert_eq!(status.available_models, vec!["llama3:8b"]);
        assert!(status.error.is_none());
    }

    #[test]
    fn disconnect_fires_once_per_transition() {
        let monitor = ConnectionMonitor::new("http://localhost:11434");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        monitor.set_on_disconnect(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.apply(1, ProbeOutcome::Connected(Vec::new()));
        monitor.apply(2, ProbeOutcome::Failed(ProbeFailure::Network));
        monitor.apply(3, ProbeOutcome::Failed(ProbeFailure::Network));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_failing_probe_does_not_fire_disconnect() {
        let monitor = ConnectionMonitor::new("http://localhost:11434");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        monitor.set_on_disconnect(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.apply(1, ProbeOutcome::Failed(ProbeFailure::Timeout));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reconnect_then_drop_fires_again() {
        let monitor = ConnectionMonitor::new("http://localhost:11434");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        monitor.set_on_disconnect(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.apply(1, ProbeOutcome::Connected(Vec::new()));
        monitor.apply(2, ProbeOutcome::Failed(ProbeFailure::Network));
        monitor.apply(3, ProbeOutcome::Connected(Vec::new()));
        monitor.apply(4, ProbeOutcome::Failed(ProbeFailure::Timeout));

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn probe_unreachable_classifies_network_or_timeout() {
        let monitor = ConnectionMonitor::new("http://127.0.0.1:19999");
        let status = monitor.probe().await;
        assert!(!status.is_connected);
        assert!(matches!(
            status.error,
            Some(ProbeFailure::Network | ProbeFailure::Timeout)
        ));
        assert!(status.last_checked.is_some());
    }
}
