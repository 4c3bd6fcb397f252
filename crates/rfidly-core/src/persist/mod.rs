// ── Scoped durable key-value persistence ──
//
// Local state that must survive a restart (the pending selection) goes
// through `KvStore`. Keys are namespaced as `scope:key` by `ScopedStore`.

mod file;
mod memory;

use std::sync::Arc;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::CoreError;

/// Minimal durable key-value interface.
pub trait KvStore: Send + Sync {
    /// Value for `key`, or `None` if it was never set or has been cleared.
    fn get(&self, key: &str) -> Result<Option<String>, CoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError>;

    /// Remove `key`. Clearing a missing key is not an error.
    fn clear(&self, key: &str) -> Result<(), CoreError>;
}

/// A view of a store restricted to one namespace.
#[derive(Clone)]
pub struct ScopedStore {
    inner: Arc<dyn KvStore>,
    scope: String,
}

impl ScopedStore {
    pub fn new(inner: Arc<dyn KvStore>, scope: impl Into<String>) -> Self {
        Self {
            inner,
            scope: scope.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.scope)
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        self.inner.get(&self.key(key))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.inner.set(&self.key(key), value)
    }

    pub fn clear(&self, key: &str) -> Result<(), CoreError> {
        self.inner.clear(&self.key(key))
    }
}

impl std::fmt::Debug for ScopedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStore")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
