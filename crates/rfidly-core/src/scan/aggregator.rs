// ── Scan aggregator ──
//
// Turns the raw, possibly duplicated scan stream into the raw list
// (newest first) and the per-EPC aggregate, and owns the selection.
// Every mutation republishes a view snapshot on a watch channel.

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::selection::Selection;
use super::{AggregateEntry, ViewRow, ViewSnapshot};
use crate::error::CoreError;
use crate::model::{RecordId, ScanEvent, TransactionRecord};
use crate::persist::ScopedStore;
use crate::stream::ViewStream;

/// Raw and aggregated scan views plus the pending selection.
///
/// Not internally synchronized; callers sharing it across tasks wrap it
/// in a mutex. Snapshots published through [`subscribe`](Self::subscribe)
/// can be read without the lock.
pub struct ScanAggregator {
    raw: VecDeque<TransactionRecord>,
    aggregate: IndexMap<String, AggregateEntry>,
    selection: Selection,
    count_mode: bool,
    view: watch::Sender<Arc<ViewSnapshot>>,
}

impl Default for ScanAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanAggregator {
    pub fn new() -> Self {
        Self::build(Selection::new())
    }

    /// An aggregator whose selection is mirrored to `store`. A selection
    /// saved by an earlier run is restored: its records join the raw list
    /// without counting as new scans.
    pub fn with_store(store: ScopedStore) -> Self {
        let mut agg = Self::build(Selection::with_store(store));
        let restored = agg.selection.restore();
        if !restored.is_empty() {
            for record in restored {
                if agg.find(&record.id).is_none() {
                    agg.selection.insert(record.id);
                    agg.raw.push_back(record);
                }
            }
            info!(count = agg.selection.len(), "restored saved selection");
            agg.publish();
        }
        agg
    }

    fn build(selection: Selection) -> Self {
        let (view, _) = watch::channel(Arc::new(ViewSnapshot::default()));
        Self {
            raw: VecDeque::new(),
            aggregate: IndexMap::new(),
            selection,
            count_mode: false,
            view,
        }
    }

    // ── Ingestion ────────────────────────────────────────────────────

    /// Record a freshly observed scan under a new temporary id.
    pub fn ingest(&mut self, event: ScanEvent) -> RecordId {
        let record = TransactionRecord::temporary(event);
        let id = record.id;
        self.ingest_record(record);
        id
    }

    /// Record a scan that may already carry a backend id.
    ///
    /// Returns `false` when a record with the same persisted id is already
    /// in the raw list; redelivered notifications are not counted twice.
    pub fn ingest_record(&mut self, record: TransactionRecord) -> bool {
        if !record.is_temporary() && self.find(&record.id).is_some() {
            debug!(id = %record.id, "duplicate scan ignored");
            return false;
        }

        let epc = record.epc().to_owned();
        match self.aggregate.shift_remove(&epc) {
            Some(mut entry) => {
                entry.occurrence_count += 1;
                if record.event.timestamp > entry.latest_record.event.timestamp {
                    entry.latest_record = record.clone();
                }
                self.aggregate.shift_insert(0, epc.clone(), entry);
            }
            None => {
                self.aggregate.shift_insert(
                    0,
                    epc.clone(),
                    AggregateEntry {
                        latest_record: record.clone(),
                        occurrence_count: 1,
                    },
                );
            }
        }
        debug!(epc = %epc, id = %record.id, "scan ingested");
        self.raw.push_front(record);
        self.publish();
        true
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn is_count_mode(&self) -> bool {
        self.count_mode
    }

    /// Raw scans, newest first.
    pub fn raw(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.raw.iter()
    }

    pub fn entry(&self, epc: &str) -> Option<&AggregateEntry> {
        self.aggregate.get(epc)
    }

    /// Aggregate entries, most recently scanned EPC first. Entries whose
    /// count was reset and not seen since are included.
    pub fn entries(&self) -> impl Iterator<Item = &AggregateEntry> {
        self.aggregate.values()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Latest published snapshot of the active view.
    pub fn view(&self) -> Arc<ViewSnapshot> {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> ViewStream {
        ViewStream::new(self.view.subscribe())
    }

    /// Selected records in selection order.
    ///
    /// In count mode a selected row stands for every occurrence of its
    /// EPC, so its record carries the occurrence count as `scan_count`.
    pub fn selected_records(&self) -> Vec<TransactionRecord> {
        self.selection
            .ids()
            .filter_map(|id| self.find(id).cloned())
            .map(|mut record| {
                if let Some(entry) = self.counted_entry(&record) {
                    record.scan_count = u32::try_from(entry.occurrence_count).unwrap_or(u32::MAX);
                }
                record
            })
            .collect()
    }

    /// The visible count-mode row `record` heads, if any.
    fn counted_entry(&self, record: &TransactionRecord) -> Option<&AggregateEntry> {
        self.aggregate.get(record.epc()).filter(|e| {
            self.count_mode && e.occurrence_count > 0 && e.latest_record.id == record.id
        })
    }

    fn find(&self, id: &RecordId) -> Option<&TransactionRecord> {
        self.raw.iter().find(|r| r.id == *id)
    }

    fn visible_ids(&self) -> Vec<RecordId> {
        if self.count_mode {
            self.aggregate
                .values()
                .filter(|e| e.occurrence_count > 0)
                .map(|e| e.latest_record.id)
                .collect()
        } else {
            self.raw.iter().map(|r| r.id).collect()
        }
    }

    // ── Selection ────────────────────────────────────────────────────

    /// Flip selection of a row in the active view. Returns `true` when the
    /// record is now selected.
    pub fn toggle_select(&mut self, id: RecordId) -> Result<bool, CoreError> {
        if !self.selection.contains(&id) && !self.visible_ids().contains(&id) {
            return Err(CoreError::validation(format!(
                "record {id} is not in the current view"
            )));
        }
        let selected = self.selection.toggle(id);
        self.selection_changed();
        Ok(selected)
    }

    /// Select every row of the active view. Returns how many were added.
    pub fn select_all(&mut self) -> usize {
        let added = self
            .visible_ids()
            .into_iter()
            .filter(|id| self.selection.insert(*id))
            .count();
        if added > 0 {
            self.selection_changed();
        }
        added
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.selection_changed();
    }

    /// Drop `ids` from the selection and keep the rest. Returns how many
    /// were selected.
    pub fn deselect(&mut self, ids: &[RecordId]) -> usize {
        let removed = ids.iter().filter(|id| self.selection.remove(id)).count();
        if removed > 0 {
            self.selection_changed();
        }
        removed
    }

    // ── Counting and mode ────────────────────────────────────────────

    /// Zero every occurrence count. The raw list and the latest records
    /// are kept; the next scan of an EPC counts from 1.
    pub fn reset_counts(&mut self) {
        for entry in self.aggregate.values_mut() {
            entry.occurrence_count = 0;
        }
        info!(epcs = self.aggregate.len(), "occurrence counts reset");
        self.publish();
    }

    /// Switch between the raw and the aggregated view.
    ///
    /// Entering count mode keeps selected records that are the latest
    /// record of a visible aggregate row and drops the rest. Leaving count
    /// mode keeps the whole selection. Returns the dropped ids.
    pub fn set_count_mode(&mut self, enabled: bool) -> Vec<RecordId> {
        if self.count_mode == enabled {
            return Vec::new();
        }
        self.count_mode = enabled;

        let dropped = if enabled {
            let visible = self.visible_ids();
            self.selection.retain(|id| visible.contains(id))
        } else {
            Vec::new()
        };
        if dropped.is_empty() {
            self.publish();
        } else {
            warn!(
                dropped = dropped.len(),
                "selected scans hidden by count mode were deselected"
            );
            self.selection_changed();
        }
        dropped
    }

    /// Replace temporary ids with backend ids wherever they appear.
    pub fn mark_persisted(&mut self, resolved: &[(RecordId, i64)]) {
        let mut selection_touched = false;
        for (from, id) in resolved {
            if !from.is_temporary() {
                continue;
            }
            let to = RecordId::Persisted(*id);
            if self.find(&to).is_some() {
                selection_touched |= self.drop_temporary(from, to);
                continue;
            }
            for record in self.raw.iter_mut().filter(|r| r.id == *from) {
                record.id = to;
            }
            for entry in self.aggregate.values_mut() {
                if entry.latest_record.id == *from {
                    entry.latest_record.id = to;
                }
            }
            if self.selection.contains(from) {
                self.selection.rename(from, to);
                selection_touched = true;
            }
        }
        if selection_touched {
            self.selection_changed();
        } else {
            self.publish();
        }
    }

    // The saved copy of a temporary record arrived first (push stream);
    // the temporary one is the same scan and goes. Returns whether the
    // selection changed.
    fn drop_temporary(&mut self, from: &RecordId, to: RecordId) -> bool {
        let Some(pos) = self.raw.iter().position(|r| r.id == *from) else {
            return false;
        };
        let Some(removed) = self.raw.remove(pos) else {
            return false;
        };
        debug!(from = %from, to = %to, "temporary scan already saved, dropped");

        let saved = self.find(&to).cloned();
        if let Some(entry) = self.aggregate.get_mut(removed.epc()) {
            entry.occurrence_count = entry.occurrence_count.saturating_sub(1);
            match saved {
                Some(saved) if entry.latest_record.id == *from => entry.latest_record = saved,
                _ => {}
            }
        }

        if !self.selection.contains(from) {
            return false;
        }
        if self.selection.contains(&to) {
            self.selection.remove(from);
        } else {
            self.selection.rename(from, to);
        }
        true
    }

    // ── Publication ──────────────────────────────────────────────────

    fn selection_changed(&mut self) {
        self.selection.persist(&self.selected_records());
        self.publish();
    }

    fn publish(&self) {
        self.view.send_replace(Arc::new(self.snapshot()));
    }

    fn snapshot(&self) -> ViewSnapshot {
        let row = |record: &TransactionRecord, count: u64| ViewRow {
            selected: self.selection.contains(&record.id),
            record: record.clone(),
            count,
        };
        let rows = if self.count_mode {
            self.aggregate
                .values()
                .filter(|e| e.occurrence_count > 0)
                .map(|e| row(&e.latest_record, e.occurrence_count))
                .collect()
        } else {
            self.raw
                .iter()
                .map(|r| row(r, u64::from(r.scan_count)))
                .collect()
        };
        ViewSnapshot {
            count_mode: self.count_mode,
            rows,
            selected: self.selection.len(),
        }
    }
}
