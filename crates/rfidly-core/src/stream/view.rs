// ── Live view subscription ──
//
// Point-in-time and reactive access to the aggregator's active view.

use std::sync::Arc;

use tokio::sync::watch;

use crate::scan::ViewSnapshot;

/// A subscription to the active scan view.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed`](Self::changed).
pub struct ViewStream {
    current: Arc<ViewSnapshot>,
    receiver: watch::Receiver<Arc<ViewSnapshot>>,
}

impl ViewStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<ViewSnapshot>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Arc<ViewSnapshot> {
        &self.current
    }

    /// Latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Arc<ViewSnapshot> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the aggregator is dropped.
    pub async fn changed(&mut self) -> Option<Arc<ViewSnapshot>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }
}
