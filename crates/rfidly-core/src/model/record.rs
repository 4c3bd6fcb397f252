// ── Transaction records ──
//
// A TransactionRecord is a ScanEvent plus its persistence identity. Until
// the backend acknowledges it, the record carries a locally minted UUID.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scan::ScanEvent;

const TEMP_PREFIX: &str = "tmp-";

// ── RecordId ────────────────────────────────────────────────────────

/// Identity of a record for selection and backend operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordId {
    /// Not yet acknowledged by the backend.
    Temporary(Uuid),
    /// Backend-issued transaction id.
    Persisted(i64),
}

impl RecordId {
    pub fn temporary() -> Self {
        Self::Temporary(Uuid::new_v4())
    }

    pub fn as_persisted(&self) -> Option<i64> {
        match self {
            Self::Persisted(id) => Some(*id),
            Self::Temporary(_) => None,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temporary(u) => write!(f, "{TEMP_PREFIX}{u}"),
            Self::Persisted(id) => write!(f, "{id}"),
        }
    }
}

/// Error returned when a string is neither a number nor a temporary id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid record id {0:?}: expected a number or tmp-<uuid>")]
pub struct ParseRecordIdError(String);

impl FromStr for RecordId {
    type Err = ParseRecordIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i64>() {
            return Ok(Self::Persisted(id));
        }
        Uuid::parse_str(s.strip_prefix(TEMP_PREFIX).unwrap_or(s))
            .map(Self::Temporary)
            .map_err(|_| ParseRecordIdError(s.to_owned()))
    }
}

// ── TransactionRecord ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: RecordId,
    #[serde(flatten)]
    pub event: ScanEvent,
    pub scan_count: u32,
}

impl TransactionRecord {
    /// A freshly observed scan with a new temporary id.
    pub fn temporary(event: ScanEvent) -> Self {
        Self {
            id: RecordId::temporary(),
            event,
            scan_count: 1,
        }
    }

    pub fn persisted(id: i64, event: ScanEvent) -> Self {
        Self {
            id: RecordId::Persisted(id),
            event,
            scan_count: 1,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.id.is_temporary()
    }

    pub fn epc(&self) -> &str {
        &self.event.epc
    }
}
