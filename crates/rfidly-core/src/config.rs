// ── Runtime station configuration ──
//
// Describes how to reach the backend, the device hub and the push service.
// The CLI builds a `StationConfig` from its profile and hands it in; core
// never reads config files.

use std::path::PathBuf;
use std::time::Duration;

use rfidly_api::FieldStyle;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed lab backends).
    DangerAcceptInvalid,
}

/// Push service coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSettings {
    pub key: String,
    pub cluster: String,
    /// Explicit WebSocket endpoint overriding the cluster host.
    pub host: Option<Url>,
    pub channel: String,
}

/// Device session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub vendor_filter: String,
    pub attempt_budget: u32,
    /// Upper bound on one discovery run.
    pub discovery_timeout: Duration,
    /// How long to wait for `Disconnected` after asking the reader to disconnect.
    pub disconnect_wait: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            vendor_filter: "ZL".into(),
            attempt_budget: 10,
            discovery_timeout: Duration::from_secs(60),
            disconnect_wait: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StationConfig {
    /// Inventory backend REST base URL.
    pub backend_url: Url,
    /// Device hub endpoint.
    pub hub_url: Url,
    pub skip_negotiation: bool,
    /// `None` disables the push stream.
    pub push: Option<PushSettings>,
    pub session: SessionSettings,
    pub field_style: FieldStyle,
    /// `batch` or `batch/add`.
    pub batch_path: String,
    pub tls: TlsVerification,
    pub timeout: Duration,
    /// Where the pending selection survives restarts. `None` keeps it in memory.
    pub selection_file: Option<PathBuf>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:9001/".parse().expect("static URL"),
            hub_url: "http://localhost:8080/deviceHub"
                .parse()
                .expect("static URL"),
            skip_negotiation: false,
            push: None,
            session: SessionSettings::default(),
            field_style: FieldStyle::default(),
            batch_path: "batch".into(),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            selection_file: None,
        }
    }
}
