//! Keyed, thread-safe parameter bag shared by one server instance.
//!
//! Used to hand instance-scoped services, such as the scenario store, to
//! matchers without global state.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type Entry = Arc<dyn Any + Send + Sync>;

/// Parameter bag.
#[derive(Default)]
pub struct Params {
    data: RwLock<HashMap<String, Entry>>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a parameter, if present and of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let entry = self.data.read().get(key).cloned()?;
        entry.downcast::<T>().ok()
    }

    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.set_shared(key, Arc::new(value));
    }

    /// Store an already shared value, keeping the caller's handle valid.
    pub fn set_shared<T: Any + Send + Sync>(&self, key: impl Into<String>, value: Arc<T>) {
        self.data.write().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.data.write().remove(key).is_some()
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Params").field("keys", &self.keys()).finish()
    }
}
