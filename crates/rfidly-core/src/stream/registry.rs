// ── Listener registry ──
//
// Event name → ordered list of listeners. Listeners are invoked outside
// the lock, so a listener may register or remove listeners itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Handle returned by [`ListenerRegistry::on`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct ListenerRegistry<T> {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener<T>)>>>,
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `event`.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_owned())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove one listener. Returns `false` if it was not registered for `event`.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut map = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = map.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            map.remove(event);
        }
        removed
    }

    /// Remove every listener for every event.
    pub fn clear(&self) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Invoke every listener for `event` in registration order.
    /// Returns how many listeners ran.
    pub fn emit(&self, event: &str, payload: &T) -> usize {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in &snapshot {
            listener(payload);
        }
        snapshot.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn listeners_run_in_registration_order() {
        let registry = ListenerRegistry::<u32>::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            registry.on("tag-scanned", move |n: &u32| {
                log.lock().unwrap_or_else(PoisonError::into_inner).push(format!("{tag}:{n}"));
            });
        }

        assert_eq!(registry.emit("tag-scanned", &7), 3);
        assert_eq!(
            *log.lock().unwrap_or_else(PoisonError::into_inner),
            vec!["first:7", "second:7", "third:7"]
        );
    }

    #[test]
    fn off_removes_only_that_listener() {
        let registry = ListenerRegistry::<()>::new();
        let a = registry.on("e", |()| {});
        let _b = registry.on("e", |()| {});

        assert!(registry.off("e", a));
        assert!(!registry.off("e", a));
        assert_eq!(registry.count("e"), 1);
        assert!(!registry.off("other", a));
    }

    #[test]
    fn emit_without_listeners_is_a_noop() {
        let registry = ListenerRegistry::<()>::new();
        assert_eq!(registry.emit("nothing", &()), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn listener_may_unregister_itself_during_emit() {
        let registry = Arc::new(ListenerRegistry::<()>::new());
        let slot: Arc<StdMutex<Option<ListenerId>>> = Arc::new(StdMutex::new(None));

        let id = {
            let registry_ref = Arc::clone(&registry);
            let slot = Arc::clone(&slot);
            registry.on("once", move |()| {
                if let Some(id) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                    registry_ref.off("once", id);
                }
            })
        };
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);

        assert_eq!(registry.emit("once", &()), 1);
        assert_eq!(registry.emit("once", &()), 0);
    }
}
