//! Named state machines for ordered, multi-step mock sequences.
//!
//! A [`ScenarioMatcher`] only compares the scenario with its required state
//! while requests are matched. The transition to the next state runs once
//! its mock was chosen, as a single fetch, compare and set under the store
//! lock, so two concurrent requests can never fire the same transition
//! twice.

use crate::error::BoxError;
use crate::expect::{Expectation, Matcher, Target, Verdict};
use crate::params::Params;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Initial state of every scenario.
pub const SCENARIO_STARTED: &str = "started";

/// Key under which a server publishes its store in its [`Params`].
pub const SCENARIO_STORE_KEY: &str = "mockcore:scenarios";

/// Outcome of [`ScenarioStore::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The scenario does not exist.
    Unknown,
    /// The scenario was in the required state. Holds the state after the call.
    Matched(String),
    /// The scenario is in another state, left unchanged.
    Rejected(String),
}

/// Scenario states keyed by normalised name.
#[derive(Debug, Default)]
pub struct ScenarioStore {
    data: Mutex<HashMap<String, String>>,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

impl ScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the store a server published in its parameter bag.
    pub fn from_params(params: &Params) -> Option<Arc<ScenarioStore>> {
        params.get::<ScenarioStore>(SCENARIO_STORE_KEY)
    }

    /// Create the scenario in the start state unless it exists. Returns its
    /// current state.
    pub fn create_if_absent(&self, name: &str) -> String {
        self.data
            .lock()
            .entry(normalize(name))
            .or_insert_with(|| SCENARIO_STARTED.to_string())
            .clone()
    }

    pub fn state(&self, name: &str) -> Option<String> {
        self.data.lock().get(&normalize(name)).cloned()
    }

    pub fn set_state(&self, name: &str, state: impl Into<String>) {
        self.data.lock().insert(normalize(name), state.into());
    }

    /// Forget a scenario. Returns whether it existed.
    pub fn reset(&self, name: &str) -> bool {
        self.data.lock().remove(&normalize(name)).is_some()
    }

    pub fn clear(&self) {
        self.data.lock().clear();
    }

    /// Compare the scenario with `required` without changing it.
    ///
    /// Requiring the start state provisions the scenario first.
    pub fn check(&self, name: &str, required: &str) -> Advance {
        let key = normalize(name);
        let mut data = self.data.lock();

        if required == SCENARIO_STARTED {
            data.entry(key.clone())
                .or_insert_with(|| SCENARIO_STARTED.to_string());
        }

        match data.get(&key) {
            None => Advance::Unknown,
            Some(state) if state.as_str() == required => Advance::Matched(state.clone()),
            Some(state) => Advance::Rejected(state.clone()),
        }
    }

    /// Atomically compare the scenario with `required` and, when equal,
    /// move it to `new_state` (unless empty).
    ///
    /// Requiring the start state provisions the scenario first.
    pub fn advance(&self, name: &str, required: &str, new_state: &str) -> Advance {
        let key = normalize(name);
        let mut data = self.data.lock();

        if required == SCENARIO_STARTED {
            data.entry(key.clone())
                .or_insert_with(|| SCENARIO_STARTED.to_string());
        }

        match data.get_mut(&key) {
            None => Advance::Unknown,
            Some(state) if state.as_str() == required => {
                if !new_state.is_empty() {
                    debug!(scenario = %key, from = %state, to = %new_state, "Scenario transition");
                    *state = new_state.to_string();
                }
                Advance::Matched(state.clone())
            }
            Some(state) => Advance::Rejected(state.clone()),
        }
    }
}

/// [`Matcher`] gating a mock on a scenario state.
pub struct ScenarioMatcher {
    store: Arc<ScenarioStore>,
    name: String,
    required_state: String,
    new_state: String,
}

impl ScenarioMatcher {
    /// `new_state` may be empty to leave the scenario where it is.
    pub fn new(
        store: Arc<ScenarioStore>,
        name: impl Into<String>,
        required_state: impl Into<String>,
        new_state: impl Into<String>,
    ) -> Self {
        Self {
            store,
            name: name.into(),
            required_state: required_state.into(),
            new_state: new_state.into(),
        }
    }

    /// Wrap the matcher in an expectation targeting this scenario.
    pub fn into_expectation<I>(self) -> Expectation<I> {
        let target = Target::Scenario(self.name.clone());
        Expectation::new(target, self)
    }
}

impl Matcher for ScenarioMatcher {
    fn name(&self) -> &str {
        "Scenario"
    }

    fn matches(&self, _value: Option<&Value>) -> Result<Verdict, BoxError> {
        let verdict = match self.store.check(&self.name, &self.required_state) {
            // A scenario that was never started does not block the mock.
            Advance::Unknown => Verdict::pass(),
            Advance::Matched(_) => Verdict::pass(),
            Advance::Rejected(actual) => Verdict::fail(format!(
                "Scenario({}): required state: {}. actual: {}",
                self.name, self.required_state, actual
            )),
        };
        Ok(verdict)
    }

    fn after_served(&self) -> bool {
        match self
            .store
            .advance(&self.name, &self.required_state, &self.new_state)
        {
            Advance::Unknown | Advance::Matched(_) => true,
            Advance::Rejected(actual) => {
                debug!(
                    scenario = %self.name,
                    required = %self.required_state,
                    actual = %actual,
                    "Scenario moved before commit"
                );
                false
            }
        }
    }

    fn revert_served(&self) {
        if !self.new_state.is_empty() {
            self.store
                .advance(&self.name, &self.new_state, &self.required_state);
        }
    }
}
