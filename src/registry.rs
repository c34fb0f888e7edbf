//! Priority ordered, concurrency safe mock storage.

use crate::mock::Mock;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Backing store of every registered mock.
///
/// Mocks are kept sorted by ascending priority; mocks with equal priority
/// keep their insertion order. Reads take a shared lock, mutations an
/// exclusive one, and enumerations hand out owned copies of the list.
pub struct MockRegistry<I> {
    mocks: RwLock<Vec<Arc<Mock<I>>>>,
}

impl<I> Default for MockRegistry<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> MockRegistry<I> {
    pub fn new() -> Self {
        Self {
            mocks: RwLock::new(Vec::new()),
        }
    }

    /// Store a mock and restore priority order.
    pub fn save(&self, mock: Arc<Mock<I>>) {
        let mut mocks = self.mocks.write();
        debug!(mock_id = %mock.id(), priority = mock.priority(), "Saving mock");
        mocks.push(mock);
        // sort_by_key is stable
        mocks.sort_by_key(|m| m.priority());
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mock<I>>> {
        self.mocks.read().iter().find(|m| m.id() == id).cloned()
    }

    pub fn get_all(&self) -> Vec<Arc<Mock<I>>> {
        self.mocks.read().clone()
    }

    /// Enabled mocks in evaluation order.
    pub fn get_eligible(&self) -> Vec<Arc<Mock<I>>> {
        self.mocks
            .read()
            .iter()
            .filter(|m| m.is_enabled())
            .cloned()
            .collect()
    }

    /// Remove a mock. Unknown ids leave the registry untouched.
    pub fn delete(&self, id: &str) -> bool {
        let mut mocks = self.mocks.write();
        match mocks.iter().position(|m| m.id() == id) {
            Some(index) => {
                mocks.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every mock loaded from an external source.
    pub fn delete_external(&self) -> usize {
        let mut mocks = self.mocks.write();
        let before = mocks.len();
        mocks.retain(|m| !m.is_external());
        before - mocks.len()
    }

    pub fn delete_all(&self) {
        self.mocks.write().clear();
    }

    pub fn len(&self) -> usize {
        self.mocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mocks.read().is_empty()
    }
}
