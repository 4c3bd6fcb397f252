// ── Pending selection ──
//
// Ordered set of record ids chosen for the next batch, mirrored to a
// scoped durable store as the list of selected records.

use indexmap::IndexSet;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{RecordId, TransactionRecord};
use crate::persist::ScopedStore;

pub(crate) const SELECTION_SCOPE: &str = "selection";
const SELECTION_KEY: &str = "selectedTransactions";

/// Selected record ids in operator order.
#[derive(Debug, Default)]
pub struct Selection {
    ids: IndexSet<RecordId>,
    store: Option<ScopedStore>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: ScopedStore) -> Self {
        Self {
            ids: IndexSet::new(),
            store: Some(store),
        }
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.ids.iter()
    }

    /// Flip membership. Returns `true` when the id is now selected.
    pub(crate) fn toggle(&mut self, id: RecordId) -> bool {
        if self.ids.shift_remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub(crate) fn insert(&mut self, id: RecordId) -> bool {
        self.ids.insert(id)
    }

    pub(crate) fn remove(&mut self, id: &RecordId) -> bool {
        self.ids.shift_remove(id)
    }

    pub(crate) fn clear(&mut self) {
        self.ids.clear();
    }

    /// Keep only ids for which `keep` is true; returns the dropped ids.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&RecordId) -> bool) -> Vec<RecordId> {
        let mut dropped = Vec::new();
        self.ids.retain(|id| {
            let kept = keep(id);
            if !kept {
                dropped.push(*id);
            }
            kept
        });
        dropped
    }

    /// Replace `from` with `to` in place, keeping its position.
    pub(crate) fn rename(&mut self, from: &RecordId, to: RecordId) {
        if self.ids.contains(from) {
            self.ids = self
                .ids
                .drain(..)
                .map(|id| if id == *from { to } else { id })
                .collect();
        }
    }

    // ── Durable side-channel ─────────────────────────────────────────

    /// Mirror the selected records. Failures are logged, not propagated:
    /// the in-memory selection stays authoritative.
    pub(crate) fn persist(&self, records: &[TransactionRecord]) {
        let Some(store) = &self.store else { return };
        let result = if records.is_empty() {
            store.clear(SELECTION_KEY)
        } else {
            serde_json::to_string(records)
                .map_err(|e| CoreError::Internal(format!("serialize selection: {e}")))
                .and_then(|json| store.set(SELECTION_KEY, &json))
        };
        match result {
            Ok(()) => debug!(count = records.len(), "selection persisted"),
            Err(e) => warn!(error = %e, "failed to persist selection"),
        }
    }

    /// Records saved by a previous run, oldest selection first.
    pub(crate) fn restore(&self) -> Vec<TransactionRecord> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        match store.get(SELECTION_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!(error = %e, "discarding unreadable saved selection");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read saved selection");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_membership_and_keeps_order() {
        let mut selection = Selection::new();
        let a = RecordId::Persisted(1);
        let b = RecordId::Persisted(2);
        let c = RecordId::Persisted(3);

        assert!(selection.toggle(a));
        assert!(selection.toggle(b));
        assert!(selection.toggle(c));
        assert!(!selection.toggle(b));

        let ids: Vec<RecordId> = selection.ids().copied().collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn rename_keeps_position() {
        let mut selection = Selection::new();
        let temp = RecordId::temporary();
        selection.insert(RecordId::Persisted(1));
        selection.insert(temp);
        selection.insert(RecordId::Persisted(3));

        selection.rename(&temp, RecordId::Persisted(2));

        let ids: Vec<RecordId> = selection.ids().copied().collect();
        assert_eq!(
            ids,
            vec![
                RecordId::Persisted(1),
                RecordId::Persisted(2),
                RecordId::Persisted(3)
            ]
        );
    }

    #[test]
    fn retain_reports_dropped_ids() {
        let mut selection = Selection::new();
        selection.insert(RecordId::Persisted(1));
        selection.insert(RecordId::Persisted(2));

        let dropped = selection.retain(|id| *id == RecordId::Persisted(2));
        assert_eq!(dropped, vec![RecordId::Persisted(1)]);
        assert_eq!(selection.len(), 1);
    }
}
