use thiserror::Error;

/// Top-level error type for the `rfidly-api` crate.
///
/// Covers every failure mode across the three wire surfaces:
/// the REST backend, the device hub control connection, and the push channel.
/// `rfidly-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request or invocation timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Backend REST ────────────────────────────────────────────────
    /// Non-success response from the inventory backend.
    #[error("Backend error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Device hub ──────────────────────────────────────────────────
    /// Hub protocol violation or rejected handshake.
    #[error("Device hub error: {message}")]
    Hub { message: String },

    /// A hub method completed with an error.
    #[error("Hub method {method} failed: {message}")]
    Invocation { method: String, message: String },

    /// The control connection is not open (or dropped mid-call).
    #[error("Device hub connection is closed")]
    HubClosed,

    // ── Push channel ────────────────────────────────────────────────
    /// `pusher:error` sent by the push service.
    #[error("Push service error{}: {message}", code.map(|c| format!(" {c}")).unwrap_or_default())]
    Push { code: Option<u16>, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}
