// ── Scan aggregation ──
//
// Raw scan list, per-EPC aggregate, operator selection, and the view
// snapshots published to subscribers.

mod aggregator;
mod selection;

use serde::Serialize;

pub use aggregator::ScanAggregator;
pub use selection::Selection;
pub(crate) use selection::SELECTION_SCOPE;

use crate::model::{RecordId, TransactionRecord};

/// Per-EPC aggregate: the newest record and how often the tag was seen
/// since the last count reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateEntry {
    pub latest_record: TransactionRecord,
    pub occurrence_count: u64,
}

/// One row of the active view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRow {
    pub record: TransactionRecord,
    /// Occurrence count in count mode, the record's scan count otherwise.
    pub count: u64,
    pub selected: bool,
}

impl ViewRow {
    pub fn id(&self) -> RecordId {
        self.record.id
    }
}

/// Immutable snapshot of the active view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub count_mode: bool,
    pub rows: Vec<ViewRow>,
    /// Size of the whole selection, including rows not visible in this view.
    pub selected: usize,
}

impl ViewSnapshot {
    pub fn row(&self, epc: &str) -> Option<&ViewRow> {
        self.rows.iter().find(|row| row.record.epc() == epc)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
