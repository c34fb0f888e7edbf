//! Mock definitions.

use crate::error::{BuildError, ReplyError};
use crate::expect::{Expectation, Target};
use crate::pipe::Pipe;
use crate::repeat::RepeatMatcher;
use crate::reply::{HttpReply, Reply, ReplyKind, StreamReply, UnaryReply};
use crate::scenario::{ScenarioMatcher, ScenarioStore, SCENARIO_STARTED};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// A registered expectation set plus the reply served when it matches.
///
/// Identity and expectations are fixed at build time. Only the enabled
/// flag and the hit counter change afterwards, each through its own atomic
/// so a hit never contends with registry-level locking.
pub struct Mock<I> {
    id: String,
    name: String,
    priority: i32,
    source: String,
    enabled: AtomicBool,
    hits: AtomicI64,
    expectations: Vec<Expectation<I>>,
    reply: Reply,
    pipes: Vec<Arc<dyn Pipe>>,
}

impl<I> Mock<I> {
    /// Start building a mock.
    pub fn builder() -> MockBuilder<I> {
        MockBuilder::new()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower values are evaluated first.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Where the mock was loaded from. Empty for programmatic mocks.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the mock was loaded from an external source such as a file.
    pub fn is_external(&self) -> bool {
        !self.source.is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Record one served request.
    pub fn inc(&self) {
        self.hits.fetch_add(1, Ordering::AcqRel);
    }

    /// Undo one recorded hit. The counter is allowed to go below zero.
    pub fn dec(&self) {
        self.hits.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn hits(&self) -> i64 {
        self.hits.load(Ordering::Acquire)
    }

    pub fn has_been_called(&self) -> bool {
        self.hits() > 0
    }

    pub fn expectations(&self) -> &[Expectation<I>] {
        &self.expectations
    }

    /// Stages the reply body streams through before it is written.
    pub fn pipes(&self) -> &[Arc<dyn Pipe>] {
        &self.pipes
    }

    /// Commit the side effects of every expectation after this mock was
    /// chosen for a request.
    ///
    /// Returns false, with already committed expectations reverted, when
    /// one of them no longer holds. The mock must not be served then.
    pub fn commit_served(&self) -> bool {
        for (i, exp) in self.expectations.iter().enumerate() {
            if !exp.matcher().after_served() {
                for done in self.expectations[..i].iter().rev() {
                    done.matcher().revert_served();
                }
                return false;
            }
        }
        true
    }

    pub fn reply(&self) -> &Reply {
        &self.reply
    }

    /// Check that the reply belongs to the protocol of `kind`.
    pub fn reply_as(&self, kind: ReplyKind) -> Result<&Reply, ReplyError> {
        if self.reply.kind() == kind {
            Ok(&self.reply)
        } else {
            Err(self.reply_mismatch(kind))
        }
    }

    pub fn http_reply(&self) -> Result<&HttpReply, ReplyError> {
        self.reply
            .as_http()
            .ok_or_else(|| self.reply_mismatch(ReplyKind::Http))
    }

    pub fn unary_reply(&self) -> Result<&UnaryReply, ReplyError> {
        self.reply
            .as_unary()
            .ok_or_else(|| self.reply_mismatch(ReplyKind::Unary))
    }

    pub fn stream_reply(&self) -> Result<&StreamReply, ReplyError> {
        self.reply
            .as_stream()
            .ok_or_else(|| self.reply_mismatch(ReplyKind::Stream))
    }

    fn reply_mismatch(&self, expected: ReplyKind) -> ReplyError {
        ReplyError::Mismatch {
            mock: self.to_string(),
            expected,
            found: self.reply.kind(),
        }
    }
}

impl<I> fmt::Display for Mock<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id, self.name)
    }
}

impl<I> fmt::Debug for Mock<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mock")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("source", &self.source)
            .field("enabled", &self.is_enabled())
            .field("hits", &self.hits())
            .field("expectations", &self.expectations.len())
            .field("reply", &self.reply.kind())
            .field("pipes", &self.pipes.len())
            .finish()
    }
}

/// Builder for [`Mock`].
pub struct MockBuilder<I> {
    name: String,
    priority: i32,
    source: String,
    enabled: bool,
    expectations: Vec<Expectation<I>>,
    reply: Option<Reply>,
    pipes: Vec<Arc<dyn Pipe>>,
    scenario: Option<ScenarioStep>,
    scenario_store: Option<Arc<ScenarioStore>>,
}

#[derive(Debug, Default)]
struct ScenarioStep {
    name: String,
    required_state: Option<String>,
    new_state: String,
}

impl<I> Default for MockBuilder<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> MockBuilder<I> {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            priority: 0,
            source: String::new(),
            enabled: true,
            expectations: Vec::new(),
            reply: None,
            pipes: Vec::new(),
            scenario: None,
            scenario_store: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the mock as loaded from an external source.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Register the mock disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Append an expectation. Order is evaluation order.
    pub fn expect(mut self, expectation: Expectation<I>) -> Self {
        self.expectations.push(expectation);
        self
    }

    pub fn reply(mut self, reply: impl Into<Reply>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Stream the reply body through `pipe`. Stages run in call order.
    pub fn pipe(mut self, pipe: Arc<dyn Pipe>) -> Self {
        self.pipes.push(pipe);
        self
    }

    /// Serve the mock at most `times` times.
    pub fn times(self, times: u64) -> Self {
        self.expect(Expectation::new(
            Target::Custom("request(repeat)".into()),
            RepeatMatcher::new(times),
        ))
    }

    /// Serve the mock only once.
    pub fn once(self) -> Self {
        self.times(1)
    }

    /// Take part in `name`, requiring its start state.
    pub fn start_scenario(mut self, name: impl Into<String>) -> Self {
        let scenario = self.scenario.get_or_insert_with(ScenarioStep::default);
        scenario.name = name.into();
        scenario.required_state = Some(SCENARIO_STARTED.to_string());
        self
    }

    /// Take part in `name`. The required state defaults to the start state.
    pub fn scenario_is(mut self, name: impl Into<String>) -> Self {
        self.scenario.get_or_insert_with(ScenarioStep::default).name = name.into();
        self
    }

    /// Serve only while the scenario is in `state`.
    pub fn scenario_state_is(mut self, state: impl Into<String>) -> Self {
        self.scenario
            .get_or_insert_with(ScenarioStep::default)
            .required_state = Some(state.into());
        self
    }

    /// Move the scenario to `state` once this mock was served.
    pub fn scenario_state_will_be(mut self, state: impl Into<String>) -> Self {
        self.scenario.get_or_insert_with(ScenarioStep::default).new_state = state.into();
        self
    }

    /// Store backing the scenario helpers. Servers set their own store
    /// when the builder has none.
    pub fn scenario_store(mut self, store: Arc<ScenarioStore>) -> Self {
        self.scenario_store = Some(store);
        self
    }

    pub(crate) fn with_default_store(mut self, store: &Arc<ScenarioStore>) -> Self {
        if self.scenario_store.is_none() {
            self.scenario_store = Some(Arc::clone(store));
        }
        self
    }

    /// Assign an identifier and produce the mock.
    pub fn build(self) -> Result<Mock<I>, BuildError> {
        let id = uuid::Uuid::new_v4().to_string();
        let reply = match self.reply {
            Some(reply) => reply,
            None => {
                let reference = if self.name.is_empty() {
                    id
                } else {
                    format!("{} ({})", id, self.name)
                };
                return Err(BuildError::MissingReply(reference));
            }
        };

        let mut expectations = self.expectations;
        if let Some(scenario) = self.scenario.filter(|s| !s.name.is_empty()) {
            let store = match self.scenario_store {
                Some(store) => store,
                None => return Err(BuildError::NoScenarioStore(scenario.name)),
            };
            let required = scenario
                .required_state
                .unwrap_or_else(|| SCENARIO_STARTED.to_string());
            // Last, so the transition commits after every other expectation.
            expectations.push(
                ScenarioMatcher::new(store, scenario.name, required, scenario.new_state)
                    .into_expectation(),
            );
        }

        Ok(Mock {
            id,
            name: self.name,
            priority: self.priority,
            source: self.source,
            enabled: AtomicBool::new(self.enabled),
            hits: AtomicI64::new(0),
            expectations,
            reply,
            pipes: self.pipes,
        })
    }
}
