// ── Scan events ──
//
// A ScanEvent is one read of one tag, produced by the reader or received
// from the push channel. Immutable once created.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the reader was scanning when the tag was read.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ScanMode {
    #[default]
    Single,
    Continuous,
    Inventory,
}

/// One tag read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    pub epc: String,
    pub rssi: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub mode: ScanMode,
    #[serde(default = "default_port")]
    pub device_no: i64,
    #[serde(default = "default_port")]
    pub antenna_no: i64,
}

fn default_port() -> i64 {
    1
}

impl ScanEvent {
    pub fn new(epc: impl Into<String>, rssi: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            epc: epc.into(),
            rssi: rssi.into(),
            timestamp,
            mode: ScanMode::default(),
            device_no: 1,
            antenna_no: 1,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_ports(mut self, device_no: i64, antenna_no: i64) -> Self {
        self.device_no = device_no;
        self.antenna_no = antenna_no;
        self
    }

    /// Timestamp in the form the backend stores (`2025-05-01T09:30:00.000Z`).
    pub fn timestamp_iso(&self) -> String {
        self.timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}

/// Parse the timestamp spellings seen on the wire.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` and the `T`-separated
/// variant without offset (both read as UTC), and epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_naive_forms() {
        let a = parse_timestamp("2025-05-01T09:30:00.250Z").unwrap();
        let b = parse_timestamp("2025-05-01 09:30:00.250").unwrap();
        let c = parse_timestamp("2025-05-01T11:30:00.250+02:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn parses_epoch_millis() {
        let ts = parse_timestamp("1746091800000").unwrap();
        assert_eq!(ts.timestamp(), 1_746_091_800);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn scan_mode_round_trips_through_strings() {
        assert_eq!("Inventory".parse::<ScanMode>().unwrap(), ScanMode::Inventory);
        assert_eq!(ScanMode::Continuous.to_string(), "continuous");
    }

    #[test]
    fn iso_timestamp_has_millis() {
        let event = ScanEvent::new("E2A", "-50.00", parse_timestamp("2025-05-01 09:30:00").unwrap());
        assert_eq!(event.timestamp_iso(), "2025-05-01T09:30:00.000Z");
    }
}
