//! Error types for the context-weaver core.

/// Top-level error type for the conversation core and file backend.
#[derive(Debug, thiserror::Error)]
pub enum WeaverError {
    /// A bounded network call exceeded its deadline.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The request could not be dispatched or received (DNS, refused
    /// connection, CORS-style policy rejection).
    #[error("network unreachable: {0}")]
    Network(String),

    /// A remote collaborator answered with a non-success status or a
    /// malformed payload.
    #[error("server error: {0}")]
    Server(String),

    /// A local precondition was not met (e.g. sending while disconnected).
    #[error("validation error: {0}")]
    Validation(String),

    /// File-serving boundary: the requested file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// File-serving boundary: the resolved path escapes the configured root.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Settings load/persist error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, WeaverError>;

impl WeaverError {
    /// Classify a `reqwest` failure into the crate taxonomy.
    ///
    /// Deadline expiry maps to [`Timeout`](Self::Timeout), transport-level
    /// failures (connect refused, DNS, policy rejection) map to
    /// [`Network`](Self::Network), anything else to [`Server`](Self::Server).
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::Network(err.to_string())
        } else {
            Self::Server(err.to_string())
        }
    }
}
