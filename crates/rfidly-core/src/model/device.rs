// ── Reader and session types ──

use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// A reader found by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    #[serde(default)]
    pub mac: String,
    pub ip: String,
    #[serde(deserialize_with = "port_from_any")]
    pub port: u16,
}

// The hub reports ports as strings.
fn port_from_any<'de, D: Deserializer<'de>>(de: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u16),
        Text(String),
    }

    match Raw::deserialize(de)? {
        Raw::Num(port) => Ok(port),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port {text:?}"))),
    }
}

/// Lifecycle phase of the device session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Discovering,
    Connecting,
    Connected,
    ScanningStarted,
    Stopping,
    Error,
}

impl SessionPhase {
    /// A reader is attached and the control connection is expected to be open.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connected | Self::ScanningStarted)
    }
}

/// Observable session state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceSessionState {
    pub phase: SessionPhase,
    pub device_ip: Option<String>,
    pub device_version: Option<String>,
    /// Last failure, replaced by each new one.
    pub last_error: Option<String>,
    /// Latest attempt counter reported during discovery.
    pub discovery_attempts: u32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn string_port_is_parsed() {
        let device: DiscoveredDevice =
            serde_json::from_str(r#"{"mac":"00:1a:2b","ip":"10.0.0.5","port":"5000"}"#).unwrap();
        assert_eq!(device.port, 5000);
    }

    #[test]
    fn phase_display_is_kebab_case() {
        assert_eq!(SessionPhase::ScanningStarted.to_string(), "scanning-started");
        assert!(SessionPhase::Connected.is_active());
        assert!(!SessionPhase::Error.is_active());
    }
}
