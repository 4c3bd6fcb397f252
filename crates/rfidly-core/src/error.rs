// ── Core error types ──
//
// Domain errors surfaced by rfidly-core. Consumers never see raw HTTP or
// WebSocket failures; the `From<rfidly_api::Error>` impl translates them.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Device session ───────────────────────────────────────────────
    #[error("Device discovery failed: {message}")]
    Discovery { message: String },

    #[error("Device connection failed: {message}")]
    Connection { message: String },

    /// A discovery or connect is already running against the control connection.
    #[error("Device session busy: {operation} already in progress")]
    SessionBusy { operation: String },

    // ── Input ────────────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── Commit ───────────────────────────────────────────────────────
    #[error("Failed to save transaction for {epc}: {message}")]
    TransactionSave { epc: String, message: String },

    #[error("Batch commit failed: {message}")]
    BatchCommit { message: String },

    // ── Push stream ──────────────────────────────────────────────────
    #[error("Stream subscription failed: {message}")]
    StreamSubscription { message: String },

    // ── Storage ──────────────────────────────────────────────────────
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    // ── Backend ──────────────────────────────────────────────────────
    #[error("Backend error: {message}")]
    Api { message: String, status: Option<u16> },

    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<rfidly_api::Error> for CoreError {
    fn from(err: rfidly_api::Error) -> Self {
        use rfidly_api::Error as Api;

        match err {
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::Connection {
                        message: format!(
                            "cannot reach {}: {e}",
                            e.url().map_or_else(|| "<unknown>".into(), ToString::to_string)
                        ),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            Api::Api { status: 404, message } => CoreError::NotFound {
                entity_type: "Resource".into(),
                identifier: message,
            },
            Api::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Tls(message) => CoreError::Connection {
                message: format!("TLS error: {message}"),
            },
            Api::WebSocketConnect(reason) => CoreError::Connection {
                message: format!("WebSocket connection failed: {reason}"),
            },
            Api::WebSocketClosed { code, reason } => CoreError::Connection {
                message: format!("WebSocket closed (code {code}): {reason}"),
            },
            Api::Hub { message } => CoreError::Connection { message },
            Api::Invocation { method, message } => CoreError::Connection {
                message: format!("{method}: {message}"),
            },
            Api::HubClosed => CoreError::Connection {
                message: "control connection closed".into(),
            },
            e @ Api::Push { .. } => CoreError::StreamSubscription {
                message: e.to_string(),
            },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
