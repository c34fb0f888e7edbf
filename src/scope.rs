//! Assertion handles over groups of mocks.
//!
//! A [`Scope`] is returned when mocks are registered together. It only
//! filters the shared registry by the ids it owns, so hits on mocks outside
//! the scope never show up in its assertions.

use crate::mock::Mock;
use crate::registry::MockRegistry;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::error;

/// Test reporting capability used by scope assertions.
pub trait Notifier {
    /// Report a failure.
    fn error(&self, message: &str);

    /// Mark the calling function as a helper. Optional.
    fn helper(&self) {}

    /// Abort the current test.
    fn fail_now(&self);
}

/// Reports through `tracing` and panics on [`Notifier::fail_now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn error(&self, message: &str) {
        error!("{}", message);
    }

    fn fail_now(&self) {
        panic!("mock assertion failed");
    }
}

/// Collects reported messages for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    failed_now: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn has_failed(&self) -> bool {
        !self.messages.lock().is_empty() || *self.failed_now.lock()
    }
}

impl Notifier for RecordingNotifier {
    fn error(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }

    fn fail_now(&self) {
        *self.failed_now.lock() = true;
    }
}

/// Caller-held view over a fixed set of registered mocks.
pub struct Scope<I> {
    registry: Arc<MockRegistry<I>>,
    ids: Mutex<HashSet<String>>,
}

impl<I> Scope<I> {
    pub fn new(registry: Arc<MockRegistry<I>>, ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            registry,
            ids: Mutex::new(ids.into_iter().collect()),
        }
    }

    /// Ids owned by this scope.
    pub fn ids(&self) -> Vec<String> {
        self.ids.lock().iter().cloned().collect()
    }

    /// Fetch an owned mock by id.
    pub fn get(&self, id: &str) -> Option<Arc<Mock<I>>> {
        if !self.ids.lock().contains(id) {
            return None;
        }
        self.registry.get(id)
    }

    /// Owned mocks still present in the registry, in registry order.
    pub fn get_all(&self) -> Vec<Arc<Mock<I>>> {
        let ids = self.ids.lock();
        self.registry
            .get_all()
            .into_iter()
            .filter(|m| ids.contains(m.id()))
            .collect()
    }

    /// Owned mocks that were never served.
    pub fn get_pending(&self) -> Vec<Arc<Mock<I>>> {
        self.get_all()
            .into_iter()
            .filter(|m| !m.has_been_called())
            .collect()
    }

    /// Owned mocks served at least once.
    pub fn get_called(&self) -> Vec<Arc<Mock<I>>> {
        self.get_all()
            .into_iter()
            .filter(|m| m.has_been_called())
            .collect()
    }

    /// True when every owned mock was served at least once.
    pub fn has_been_called(&self) -> bool {
        self.get_all().iter().all(|m| m.has_been_called())
    }

    /// True when at least one owned mock was never served.
    pub fn is_pending(&self) -> bool {
        !self.has_been_called()
    }

    /// Sum of hits across owned mocks only.
    pub fn hits(&self) -> i64 {
        self.get_all().iter().map(|m| m.hits()).sum()
    }

    pub fn enable(&self) {
        for mock in self.get_all() {
            mock.enable();
        }
    }

    pub fn disable(&self) {
        for mock in self.get_all() {
            mock.disable();
        }
    }

    /// Delete an owned mock from the scope and the registry.
    ///
    /// Returns false, touching nothing, when the id is not owned here.
    pub fn delete(&self, id: &str) -> bool {
        let mut ids = self.ids.lock();
        if !ids.remove(id) {
            return false;
        }
        self.registry.delete(id);
        true
    }

    /// Delete every owned mock.
    pub fn clean(&self) {
        let mut ids = self.ids.lock();
        for id in ids.drain() {
            self.registry.delete(&id);
        }
    }

    /// Report every mock that was never served.
    pub fn assert_called(&self, notifier: &dyn Notifier) -> bool {
        notifier.helper();

        let pending = self.get_pending();
        if pending.is_empty() {
            return true;
        }

        notifier.error(&format!(
            "\nThere are still {} mocks that were not called.\nPending:\n{}",
            pending.len(),
            list_mocks(&pending, "   ")
        ));

        false
    }

    /// Report every mock that was served although none should have been.
    pub fn assert_not_called(&self, notifier: &dyn Notifier) -> bool {
        notifier.helper();

        let called = self.get_called();
        if called.is_empty() {
            return true;
        }

        notifier.error(&format!(
            "\n{} Mocks were called at least once when none should be.\nCalled:\n{}",
            called.len(),
            list_mocks(&called, "  ")
        ));

        false
    }

    /// Report when the summed hits differ from `expected`.
    pub fn assert_number_of_calls(&self, notifier: &dyn Notifier, expected: i64) -> bool {
        notifier.helper();

        let hits = self.hits();
        if hits == expected {
            return true;
        }

        notifier.error(&format!(
            "\nExpected {} matched request hits.\nGot {}",
            expected, hits
        ));

        false
    }
}

impl<I> std::fmt::Debug for Scope<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("ids", &self.ids())
            .field("hits", &self.hits())
            .finish()
    }
}

fn list_mocks<I>(mocks: &[Arc<Mock<I>>], indent: &str) -> String {
    let mut buf = String::new();
    for mock in mocks {
        let _ = writeln!(buf, "{}Mock [{}] {}", indent, mock.id(), mock.name());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expect::tests::Req;
    use crate::reply::HttpReply;

    struct Fixture {
        registry: Arc<MockRegistry<Req>>,
        scope: Scope<Req>,
        inside: Vec<Arc<Mock<Req>>>,
        outside: Arc<Mock<Req>>,
    }

    fn mock(name: &str) -> Arc<Mock<Req>> {
        Arc::new(
            Mock::builder()
                .name(name)
                .reply(HttpReply::ok())
                .build()
                .unwrap(),
        )
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(MockRegistry::new());
        let inside = vec![mock("one"), mock("two")];
        let outside = mock("other");
        for m in inside.iter().chain(std::iter::once(&outside)) {
            registry.save(Arc::clone(m));
        }
        let scope = Scope::new(
            Arc::clone(&registry),
            inside.iter().map(|m| m.id().to_string()),
        );
        Fixture {
            registry,
            scope,
            inside,
            outside,
        }
    }

    #[test]
    fn test_partitions_by_hits() {
        let f = fixture();
        assert_eq!(f.scope.get_all().len(), 2);
        assert_eq!(f.scope.get_pending().len(), 2);
        assert!(f.scope.get_called().is_empty());
        assert!(f.scope.is_pending());

        f.inside[0].inc();
        assert_eq!(f.scope.get_called()[0].name(), "one");
        assert_eq!(f.scope.get_pending()[0].name(), "two");
        assert!(!f.scope.has_been_called());

        f.inside[1].inc();
        assert!(f.scope.has_been_called());
        assert!(!f.scope.is_pending());
    }

    #[test]
    fn test_hits_are_isolated() {
        let f = fixture();
        f.outside.inc();
        f.outside.inc();
        assert_eq!(f.scope.hits(), 0);

        f.inside[1].inc();
        assert_eq!(f.scope.hits(), 1);
    }

    #[test]
    fn test_get_only_returns_owned() {
        let f = fixture();
        assert!(f.scope.get(f.inside[0].id()).is_some());
        assert!(f.scope.get(f.outside.id()).is_none());
    }

    #[test]
    fn test_disable_enable_only_owned() {
        let f = fixture();
        f.scope.disable();
        assert_eq!(f.registry.get_eligible().len(), 1);
        assert!(f.outside.is_enabled());

        f.scope.enable();
        assert_eq!(f.registry.get_eligible().len(), 3);
    }

    #[test]
    fn test_delete() {
        let f = fixture();
        assert!(!f.scope.delete(f.outside.id()));
        assert_eq!(f.registry.len(), 3);

        assert!(f.scope.delete(f.inside[0].id()));
        assert_eq!(f.registry.len(), 2);
        assert_eq!(f.scope.get_all().len(), 1);
        assert!(!f.scope.delete(f.inside[0].id()));
    }

    #[test]
    fn test_clean() {
        let f = fixture();
        f.scope.clean();
        assert!(f.scope.ids().is_empty());
        assert_eq!(f.registry.len(), 1);
        assert!(f.registry.get(f.outside.id()).is_some());
    }

    #[test]
    fn test_assert_called() {
        let f = fixture();
        let notifier = RecordingNotifier::new();

        f.inside[0].inc();
        assert!(!f.scope.assert_called(&notifier));
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("There are still 1 mocks that were not called."));
        assert!(messages[0].contains(&format!("Mock [{}] two", f.inside[1].id())));

        f.inside[1].inc();
        let notifier = RecordingNotifier::new();
        assert!(f.scope.assert_called(&notifier));
        assert!(!notifier.has_failed());
    }

    #[test]
    fn test_assert_not_called() {
        let f = fixture();
        let notifier = RecordingNotifier::new();
        assert!(f.scope.assert_not_called(&notifier));

        f.outside.inc();
        assert!(f.scope.assert_not_called(&notifier));

        f.inside[1].inc();
        assert!(!f.scope.assert_not_called(&notifier));
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("1 Mocks were called at least once"));
        assert!(messages[0].contains(&format!("Mock [{}] two", f.inside[1].id())));
    }

    #[test]
    fn test_assert_number_of_calls() {
        let f = fixture();
        let notifier = RecordingNotifier::new();
        f.inside[0].inc();
        f.inside[0].inc();
        f.outside.inc();

        assert!(f.scope.assert_number_of_calls(&notifier, 2));
        assert!(!f.scope.assert_number_of_calls(&notifier, 3));
        assert_eq!(
            notifier.messages(),
            vec!["\nExpected 3 matched request hits.\nGot 2".to_string()]
        );
    }

    #[test]
    fn test_assertions_combine() {
        let f = fixture();
        let notifier = RecordingNotifier::new();
        let ok = f.scope.assert_called(&notifier) & f.scope.assert_number_of_calls(&notifier, 1);
        assert!(!ok);
        assert_eq!(notifier.messages().len(), 2);
    }

    #[test]
    fn test_debug_lists_owned_ids() {
        let f = fixture();
        let rendered = format!("{:?}", f.scope);
        assert!(rendered.starts_with("Scope"));
        assert!(rendered.contains(f.inside[0].id()));
        assert!(!rendered.contains(f.outside.id()));
    }
}
