// ── Batches and commit results ──

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::record::RecordId;

/// A named group of persisted transactions. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub transaction_ids: Vec<i64>,
}

/// A record that could not be saved during a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordError {
    pub record: RecordId,
    pub epc: String,
    pub message: String,
}

/// Outcome of a batch commit that produced a batch.
///
/// Per-record save failures are reported here rather than raised.
#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    pub batch: Batch,
    /// Records that ended up in the batch (already persisted + newly saved).
    pub saved_count: usize,
    pub failed_count: usize,
    /// Ids in the order records were resolved.
    pub transaction_ids: Vec<i64>,
    pub per_record_errors: Vec<RecordError>,
    /// Temporary records saved during this commit, with their new ids.
    pub resolved: Vec<(RecordId, i64)>,
}

impl CommitReport {
    pub fn batch_id(&self) -> i64 {
        self.batch.id
    }

    pub fn is_partial(&self) -> bool {
        self.failed_count > 0
    }
}
