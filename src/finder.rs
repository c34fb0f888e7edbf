//! Mock lookup for an incoming request.

use crate::expect::{evaluate, MismatchDetail};
use crate::mock::Mock;
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// Result of looking up a mock for one request.
pub struct FindResult<I> {
    /// Whether a mock matched every expectation.
    pub pass: bool,
    /// The winning mock when `pass` is true.
    pub matched: Option<Arc<Mock<I>>>,
    /// Highest weighted partial match when nothing matched.
    pub closest_match: Option<Arc<Mock<I>>>,
    /// Diagnostics from every mock that was evaluated and missed.
    pub mismatch_details: Vec<MismatchDetail>,
    /// Number of mocks that were evaluated and missed.
    pub mismatches: usize,
}

impl<I> fmt::Debug for FindResult<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindResult")
            .field("pass", &self.pass)
            .field("matched", &self.matched)
            .field("closest_match", &self.closest_match)
            .field("mismatch_details", &self.mismatch_details)
            .field("mismatches", &self.mismatches)
            .finish()
    }
}

impl<I> FindResult<I> {
    /// Human readable explanation of a miss.
    pub fn report(&self) -> String {
        let mut buf = String::from("REQUEST DID NOT MATCH\n");

        if let Some(closest) = &self.closest_match {
            let _ = writeln!(buf, "NEAREST: {} {}", closest.id(), closest.name());
        }

        if !self.mismatch_details.is_empty() {
            buf.push_str("MISSES:\n");
            for detail in &self.mismatch_details {
                let _ = writeln!(buf, "  {detail}");
            }
        }

        buf
    }
}

/// Find the mock that answers `input`.
///
/// `mocks` must already be limited to enabled mocks and sorted in registry
/// order. The first full match wins and later mocks are not evaluated. On a
/// miss the mock with the strictly highest partial weight is reported as
/// the closest match; a weight of zero never qualifies.
///
/// This function does not touch hit counters.
pub fn find_mock_for_request<I>(mocks: &[Arc<Mock<I>>], input: &I) -> FindResult<I> {
    let mut closest: Option<&Arc<Mock<I>>> = None;
    let mut best_weight = 0;
    let mut details = Vec::new();
    let mut mismatches = 0;

    for mock in mocks {
        let result = evaluate(input, mock.expectations());

        if result.pass {
            return FindResult {
                pass: true,
                matched: Some(Arc::clone(mock)),
                closest_match: None,
                mismatch_details: Vec::new(),
                mismatches,
            };
        }

        if result.weight > best_weight {
            closest = Some(mock);
            best_weight = result.weight;
        }

        mismatches += 1;
        details.extend(result.details);
    }

    FindResult {
        pass: false,
        matched: None,
        closest_match: closest.cloned(),
        mismatch_details: details,
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expect::tests::{always, equal_to, req, Req};
    use crate::expect::{matcher_fn, Expectation, Target, Verdict, Weight};
    use crate::reply::HttpReply;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mock(name: &str, expectations: Vec<Expectation<Req>>) -> Arc<Mock<Req>> {
        let mut builder = Mock::builder().name(name).reply(HttpReply::ok());
        for exp in expectations {
            builder = builder.expect(exp);
        }
        Arc::new(builder.build().unwrap())
    }

    fn exp(pass: bool, weight: u32) -> Expectation<Req> {
        Expectation::new(Target::Request, always(pass)).weight(weight)
    }

    #[test]
    fn test_first_full_match_wins() {
        let mocks = vec![
            mock("miss", vec![exp(false, 3)]),
            mock("first", vec![exp(true, 1)]),
            mock("second", vec![exp(true, 1)]),
        ];
        let result = find_mock_for_request(&mocks, &req("GET", "/"));

        assert!(result.pass);
        assert_eq!(result.matched.unwrap().name(), "first");
        assert!(result.closest_match.is_none());
        assert_eq!(result.mismatches, 1);
    }

    #[test]
    fn test_later_mocks_are_not_evaluated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let spy = matcher_fn("Spy", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Verdict::pass())
        });

        let mocks = vec![
            mock("winner", vec![exp(true, 1)]),
            mock("spied", vec![Expectation::new(Target::Request, spy)]),
        ];
        let result = find_mock_for_request(&mocks, &req("GET", "/"));

        assert!(result.pass);
        assert_eq!(result.matched.unwrap().name(), "winner");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_closest_match_is_highest_weight() {
        let mocks = vec![
            mock("low", vec![exp(true, 1), exp(false, 1)]),
            mock("high", vec![exp(true, 3), exp(false, 1)]),
            mock("tie", vec![exp(true, 3), exp(false, 2)]),
        ];
        let result = find_mock_for_request(&mocks, &req("GET", "/"));

        assert!(!result.pass);
        assert!(result.matched.is_none());
        assert_eq!(result.closest_match.unwrap().name(), "high");
        assert_eq!(result.mismatches, 3);
        assert_eq!(result.mismatch_details.len(), 3);
    }

    #[test]
    fn test_zero_weight_misses_have_no_closest_match() {
        let mocks = vec![
            mock("a", vec![exp(true, 0), exp(false, 2)]),
            mock("b", vec![exp(false, 1)]),
        ];
        let result = find_mock_for_request(&mocks, &req("GET", "/"));

        assert!(!result.pass);
        assert!(result.closest_match.is_none());
        assert_eq!(result.mismatches, 2);
    }

    #[test]
    fn test_empty_registry() {
        let result = find_mock_for_request::<Req>(&[], &req("GET", "/"));
        assert!(!result.pass);
        assert_eq!(result.mismatches, 0);
        assert_eq!(result.report(), "REQUEST DID NOT MATCH\n");
    }

    #[test]
    fn test_report_lists_nearest_and_misses() {
        let users = mock(
            "users",
            vec![
                Expectation::new(Target::Method, equal_to("GET"))
                    .select(|r: &Req| Some(json!(r.method)))
                    .weight(Weight::REGULAR),
                Expectation::new(Target::Url, equal_to("/users"))
                    .select(|r: &Req| Some(json!(r.path)))
                    .weight(Weight::LOW),
            ],
        );
        let result = find_mock_for_request(std::slice::from_ref(&users), &req("GET", "/posts"));
        let report = result.report();

        assert!(report.starts_with("REQUEST DID NOT MATCH\n"));
        assert!(report.contains(&format!("NEAREST: {} users", users.id())));
        assert!(report.contains("MISSES:\n  url: EqualTo:"));
    }
}
