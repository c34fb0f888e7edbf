//! Serve limits for mocks.

use crate::error::BoxError;
use crate::expect::{Matcher, Verdict};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// [`Matcher`] that stops passing once its mock was served `times` times.
///
/// The count is reserved in [`Matcher::after_served`] with a compare and
/// swap, so concurrent requests can never serve the mock more often.
#[derive(Debug)]
pub struct RepeatMatcher {
    times: u64,
    served: AtomicU64,
}

impl RepeatMatcher {
    pub fn new(times: u64) -> Self {
        Self {
            times,
            served: AtomicU64::new(0),
        }
    }

    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> u64 {
        self.times.saturating_sub(self.served())
    }
}

impl Matcher for RepeatMatcher {
    fn name(&self) -> &str {
        "Repeat"
    }

    fn matches(&self, _value: Option<&Value>) -> Result<Verdict, BoxError> {
        let served = self.served();
        Ok(if served < self.times {
            Verdict::pass()
        } else {
            Verdict::fail(format!(
                "Repeat({}): already served {} times",
                self.times, served
            ))
        })
    }

    fn after_served(&self) -> bool {
        self.served
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.times).then_some(n + 1)
            })
            .is_ok()
    }

    fn revert_served(&self) {
        let _ = self
            .served
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}
