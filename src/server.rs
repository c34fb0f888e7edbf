//! Mock server facade tying the engine together.
//!
//! Transport adapters translate their native request into some input type
//! `I`, call [`MockServer::dispatch`] (or [`MockServer::dispatch_as`]) and
//! render the returned reply themselves.

use crate::config::{EngineConfig, GlobalSettings};
use crate::error::{BuildError, ReplyError};
use crate::expect::Expectation;
use crate::finder::{find_mock_for_request, FindResult};
use crate::mock::{Mock, MockBuilder};
use crate::params::Params;
use crate::pipe::{Connector, Pipe};
use crate::registry::MockRegistry;
use crate::reply::ReplyKind;
use crate::scenario::{ScenarioMatcher, ScenarioStore, SCENARIO_STORE_KEY};
use crate::scope::Scope;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Dispatch rounds tried before a mock that keeps losing its commit is
/// given up on.
const MAX_COMMIT_ATTEMPTS: usize = 16;

/// Outcome of dispatching one request.
pub enum Dispatch<I> {
    /// A mock matched; its hit counter was already incremented.
    Matched(Arc<Mock<I>>),
    /// No mock matched.
    NotMatched(NoMatch<I>),
}

impl<I> Dispatch<I> {
    pub fn is_matched(&self) -> bool {
        matches!(self, Dispatch::Matched(_))
    }

    /// The served mock, if any.
    pub fn mock(&self) -> Option<&Arc<Mock<I>>> {
        match self {
            Dispatch::Matched(mock) => Some(mock),
            Dispatch::NotMatched(_) => None,
        }
    }
}

impl<I> fmt::Debug for Dispatch<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Matched(mock) => f.debug_tuple("Matched").field(mock).finish(),
            Dispatch::NotMatched(miss) => f.debug_tuple("NotMatched").field(miss).finish(),
        }
    }
}

/// Details of a request no mock matched.
pub struct NoMatch<I> {
    /// Dispatcher diagnostics.
    pub result: FindResult<I>,
    /// Status code adapters should answer with.
    pub status: u16,
}

impl<I> NoMatch<I> {
    /// Human readable explanation, suitable as a response body.
    pub fn report(&self) -> String {
        self.result.report()
    }
}

impl<I> fmt::Debug for NoMatch<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoMatch")
            .field("result", &self.result)
            .field("status", &self.status)
            .finish()
    }
}

/// Snapshot of server counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    pub requests_total: u64,
    pub requests_matched: u64,
    pub requests_unmatched: u64,
    /// Matched requests rejected because the mock's reply had the wrong protocol.
    pub reply_errors: u64,
    pub mocks_registered: usize,
    pub mocks_enabled: usize,
}

/// One mock server instance.
///
/// Owns the registry, the scenario store and the parameter bag. Nothing is
/// shared between instances.
pub struct MockServer<I> {
    config: EngineConfig,
    registry: Arc<MockRegistry<I>>,
    scenarios: Arc<ScenarioStore>,
    params: Params,
    /// Total requests dispatched.
    requests_total: AtomicU64,
    /// Total requests served by a mock.
    requests_matched: AtomicU64,
    /// Total requests no mock matched.
    requests_unmatched: AtomicU64,
    /// Total requests whose mock had a reply for another protocol.
    reply_errors: AtomicU64,
}

impl<I> Default for MockServer<I> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<I> MockServer<I> {
    /// Create a server with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        let scenarios = Arc::new(ScenarioStore::new());
        let params = Params::new();
        params.set_shared(SCENARIO_STORE_KEY, Arc::clone(&scenarios));

        info!(
            log_matches = config.settings.log_matches,
            log_unmatched = config.settings.log_unmatched,
            not_matched_status = config.settings.not_matched_status,
            "Mock server initialized"
        );

        Self {
            config,
            registry: Arc::new(MockRegistry::new()),
            scenarios,
            params,
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
            reply_errors: AtomicU64::new(0),
        }
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(Self::new(EngineConfig::from_yaml(yaml)?))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.config.settings
    }

    pub fn registry(&self) -> &Arc<MockRegistry<I>> {
        &self.registry
    }

    pub fn scenarios(&self) -> &Arc<ScenarioStore> {
        &self.scenarios
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Get total requests dispatched.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get total requests matched.
    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    /// Get total requests unmatched.
    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> ServerStats {
        let mocks = self.registry.get_all();
        ServerStats {
            requests_total: self.total_requests(),
            requests_matched: self.total_matched(),
            requests_unmatched: self.total_unmatched(),
            reply_errors: self.reply_errors.load(Ordering::Relaxed),
            mocks_registered: mocks.len(),
            mocks_enabled: mocks.iter().filter(|m| m.is_enabled()).count(),
        }
    }

    /// Build and register mocks, returning a scope over exactly these.
    ///
    /// Nothing is registered when any builder fails.
    pub fn mock(
        &self,
        builders: impl IntoIterator<Item = MockBuilder<I>>,
    ) -> Result<Scope<I>, BuildError> {
        let mocks = builders
            .into_iter()
            .map(|builder| builder.with_default_store(&self.scenarios).build())
            .collect::<Result<Vec<_>, _>>()?;

        let ids: Vec<String> = mocks.iter().map(|m| m.id().to_string()).collect();
        for mock in mocks {
            self.registry.save(Arc::new(mock));
        }

        info!(mocks = ids.len(), total = self.registry.len(), "Mocks registered");

        Ok(Scope::new(Arc::clone(&self.registry), ids))
    }

    /// Replace every externally loaded mock with `builders`.
    ///
    /// Programmatic mocks are kept. Nothing changes when any builder fails.
    pub fn reload_external(
        &self,
        builders: impl IntoIterator<Item = MockBuilder<I>>,
    ) -> Result<Scope<I>, BuildError> {
        let mocks = builders
            .into_iter()
            .map(|builder| builder.with_default_store(&self.scenarios).build())
            .collect::<Result<Vec<_>, _>>()?;

        let removed = self.registry.delete_external();
        let ids: Vec<String> = mocks.iter().map(|m| m.id().to_string()).collect();
        for mock in mocks {
            self.registry.save(Arc::new(mock));
        }

        info!(removed, loaded = ids.len(), "External mocks reloaded");

        Ok(Scope::new(Arc::clone(&self.registry), ids))
    }

    /// Expectation gating a mock on this server's scenario store.
    pub fn scenario(
        &self,
        name: impl Into<String>,
        required_state: impl Into<String>,
        new_state: impl Into<String>,
    ) -> Expectation<I> {
        ScenarioMatcher::new(Arc::clone(&self.scenarios), name, required_state, new_state)
            .into_expectation()
    }

    /// Find the mock answering `input` and record the hit.
    pub fn dispatch(&self, input: &I) -> Dispatch<I> {
        match self.resolve(input, |_| Ok::<(), Infallible>(())) {
            Ok(dispatch) => dispatch,
            Err(never) => match never {},
        }
    }

    /// Like [`dispatch`](Self::dispatch) for adapters that can only render
    /// one reply protocol.
    ///
    /// A matched mock with a reply of another protocol is an error. Its hit
    /// counter and scenario are left untouched.
    pub fn dispatch_as(&self, input: &I, kind: ReplyKind) -> Result<Dispatch<I>, ReplyError> {
        self.resolve(input, |mock| match mock.reply_as(kind) {
            Ok(_) => Ok(()),
            Err(err) => {
                self.reply_errors.fetch_add(1, Ordering::Relaxed);
                warn!(mock_id = %mock.id(), error = %err, "Matched mock has wrong reply type");
                Err(err)
            }
        })
    }

    /// Pipeline over `pipes` using the configured channel capacity.
    pub fn connector(&self, pipes: Vec<Arc<dyn Pipe>>) -> Connector {
        Connector::new(pipes, self.config.pipeline.channel_capacity)
    }

    /// Pipeline over the stages registered on `mock`.
    pub fn connector_for(&self, mock: &Mock<I>) -> Connector {
        self.connector(mock.pipes().to_vec())
    }

    /// Run the dispatcher, then commit the winner's expectations before the
    /// hit is recorded. A winner whose state changed in between is not
    /// served and the request is dispatched again.
    fn resolve<E>(
        &self,
        input: &I,
        check: impl Fn(&Mock<I>) -> Result<(), E>,
    ) -> Result<Dispatch<I>, E> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let mut contended = None;
        for attempt in 0..MAX_COMMIT_ATTEMPTS {
            let eligible = self.registry.get_eligible();
            let mut result = find_mock_for_request(&eligible, input);

            let mock = match result.matched.take() {
                Some(mock) => mock,
                None => return Ok(self.not_matched(result)),
            };

            check(mock.as_ref())?;

            if mock.commit_served() {
                return Ok(self.serve(mock));
            }

            debug!(mock_id = %mock.id(), attempt, "Mock state changed before commit");
            contended = Some(mock);
        }

        warn!(attempts = MAX_COMMIT_ATTEMPTS, "Gave up serving a contended mock");
        Ok(self.not_matched(FindResult {
            pass: false,
            matched: None,
            closest_match: contended,
            mismatch_details: Vec::new(),
            mismatches: 1,
        }))
    }

    fn serve(&self, mock: Arc<Mock<I>>) -> Dispatch<I> {
        mock.inc();
        self.requests_matched.fetch_add(1, Ordering::Relaxed);

        if self.config.settings.log_matches {
            info!(
                mock_id = %mock.id(),
                mock_name = %mock.name(),
                hits = mock.hits(),
                "Request matched mock"
            );
        }

        Dispatch::Matched(mock)
    }

    fn not_matched(&self, result: FindResult<I>) -> Dispatch<I> {
        self.requests_unmatched.fetch_add(1, Ordering::Relaxed);

        if self.config.settings.log_unmatched {
            warn!(
                evaluated = result.mismatches,
                closest = result.closest_match.as_ref().map(|m| m.id()).unwrap_or("none"),
                "No matching mock found"
            );
            debug!(report = %result.report(), "Mismatch report");
        }

        Dispatch::NotMatched(NoMatch {
            result,
            status: self.config.settings.not_matched_status,
        })
    }
}
