//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use rfidly_config::ConfigError;
use rfidly_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const PARTIAL: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum CliError {
    // ── Devices ──────────────────────────────────────────────────────

    #[error("Device discovery failed: {message}")]
    #[diagnostic(
        code(rfidly::discovery_failed),
        help(
            "Check that the device hub is running and the reader is powered on.\n\
             Try a larger budget: rfidly devices discover --attempts 20"
        )
    )]
    Discovery { message: String },

    #[error("Could not connect: {message}")]
    #[diagnostic(
        code(rfidly::connection_failed),
        help(
            "Check the hub URL in your profile (rfidly config show) and that\n\
             the reader address is reachable."
        )
    )]
    ConnectionFailed { message: String },

    #[error("Device session busy: {operation} already in progress")]
    #[diagnostic(code(rfidly::session_busy))]
    SessionBusy { operation: String },

    #[error("Scan stream unavailable: {message}")]
    #[diagnostic(
        code(rfidly::stream),
        help("Set a push key on the profile: rfidly config set push_key <KEY>")
    )]
    Stream { message: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(rfidly::not_found),
        help("Run: rfidly {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Commit ───────────────────────────────────────────────────────

    #[error("Batch commit failed: {message}")]
    #[diagnostic(
        code(rfidly::commit_failed),
        help("The selection was kept. Fix the cause and run the same command again.")
    )]
    BatchCommit { message: String },

    #[error("Batch {batch_id} created, but {failed} of {total} records could not be saved")]
    #[diagnostic(
        code(rfidly::partial_commit),
        help("The failed records are listed above; scan them again to include them in a new batch.")
    )]
    PartialCommit {
        batch_id: i64,
        failed: usize,
        total: usize,
    },

    // ── API ──────────────────────────────────────────────────────────

    #[error("Backend error ({code}): {message}")]
    #[diagnostic(code(rfidly::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(rfidly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(rfidly::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: rfidly config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(rfidly::no_config),
        help(
            "Create one with: rfidly config init\n\
             Or pass --backend / --hub.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(rfidly::config))]
    Config(#[from] ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(rfidly::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO ───────────────────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Discovery { .. } | Self::ConnectionFailed { .. } | Self::Stream { .. } => {
                exit_code::CONNECTION
            }
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::PartialCommit { .. } => exit_code::PARTIAL,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Discovery { message } => CliError::Discovery { message },

            CoreError::Connection { message } => CliError::ConnectionFailed { message },

            CoreError::SessionBusy { operation } => CliError::SessionBusy { operation },

            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::TransactionSave { epc, message } => CliError::ApiError {
                code: "transaction_save".into(),
                message: format!("{epc}: {message}"),
            },

            CoreError::BatchCommit { message } => CliError::BatchCommit { message },

            CoreError::StreamSubscription { message } => CliError::Stream { message },

            CoreError::Persistence { message } => CliError::Io(std::io::Error::other(message)),

            CoreError::Api { message, status } => CliError::ApiError {
                code: status.map_or_else(|| "unknown".into(), |s| s.to_string()),
                message,
            },

            CoreError::NotFound {
                entity_type,
                identifier,
            } => CliError::NotFound {
                list_command: format!("{}s list", entity_type.to_lowercase()),
                resource_type: entity_type,
                identifier,
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}
