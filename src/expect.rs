//! Expectations and the match engine.
//!
//! An [`Expectation`] binds one [`Matcher`] to a value selected from the
//! adapter's request input. [`evaluate`] runs a mock's whole expectation
//! list and always visits every entry, so a miss carries the complete
//! list of reasons and not only the first one.

use crate::error::{BoxError, MatchError};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Verdict produced by a [`Matcher`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the value satisfied the matcher.
    pub pass: bool,
    /// Why the value did not satisfy the matcher. Empty on pass.
    pub message: String,
}

impl Verdict {
    /// A passing verdict.
    pub fn pass() -> Self {
        Self {
            pass: true,
            message: String::new(),
        }
    }

    /// A failing verdict with a reason.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            pass: false,
            message: message.into(),
        }
    }
}

/// Predicate over a selected request value.
///
/// Implementations may return errors and may even panic; the engine
/// converts both into a [`MatchError`] and keeps going.
pub trait Matcher: Send + Sync {
    /// Name used in mismatch diagnostics.
    fn name(&self) -> &str;

    /// Check the selected value. `None` means the selector found nothing.
    /// Must not change any state.
    fn matches(&self, value: Option<&Value>) -> Result<Verdict, BoxError>;

    /// Commit side effects once the owning mock was chosen to serve a
    /// request. Returns false when the state checked by [`matches`] changed
    /// in between; the mock is then not served.
    ///
    /// [`matches`]: Matcher::matches
    fn after_served(&self) -> bool {
        true
    }

    /// Undo a successful [`after_served`](Matcher::after_served) when
    /// another matcher of the same mock refused to commit.
    fn revert_served(&self) {}
}

/// [`Matcher`] backed by a closure.
pub struct FnMatcher<F> {
    name: String,
    f: F,
}

impl<F> Matcher for FnMatcher<F>
where
    F: Fn(Option<&Value>) -> Result<Verdict, BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, value: Option<&Value>) -> Result<Verdict, BoxError> {
        (self.f)(value)
    }
}

/// Build a named matcher from a closure.
pub fn matcher_fn<F>(name: impl Into<String>, f: F) -> FnMatcher<F>
where
    F: Fn(Option<&Value>) -> Result<Verdict, BoxError> + Send + Sync,
{
    FnMatcher {
        name: name.into(),
        f,
    }
}

/// Part of the request an expectation looks at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Request,
    Scheme,
    Method,
    Url,
    Header(String),
    Query(String),
    Body,
    Form(String),
    /// gRPC metadata entry.
    Metadata(String),
    Scenario(String),
    Custom(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Request => f.write_str("request"),
            Target::Scheme => f.write_str("scheme"),
            Target::Method => f.write_str("method"),
            Target::Url => f.write_str("url"),
            Target::Header(key) => write!(f, "header({key})"),
            Target::Query(key) => write!(f, "query({key})"),
            Target::Body => f.write_str("body"),
            Target::Form(key) => write!(f, "form({key})"),
            Target::Metadata(key) => write!(f, "metadata({key})"),
            Target::Scenario(name) => write!(f, "scenario({name})"),
            Target::Custom(text) => f.write_str(text),
        }
    }
}

/// Importance tier of an expectation. Only used to rank partial matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Weight(pub u32);

impl Weight {
    pub const NONE: Weight = Weight(0);
    pub const LOW: Weight = Weight(1);
    pub const REGULAR: Weight = Weight(2);
    pub const HIGH: Weight = Weight(3);
}

impl From<u32> for Weight {
    fn from(value: u32) -> Self {
        Weight(value)
    }
}

/// Pure function selecting a value from the adapter's request input.
pub type ValueSelector<I> = Arc<dyn Fn(&I) -> Option<Value> + Send + Sync>;

/// One matching rule of a mock.
pub struct Expectation<I> {
    target: Target,
    matcher: Arc<dyn Matcher>,
    selector: Option<ValueSelector<I>>,
    weight: Weight,
}

impl<I> Clone for Expectation<I> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            matcher: Arc::clone(&self.matcher),
            selector: self.selector.clone(),
            weight: self.weight,
        }
    }
}

impl<I> fmt::Debug for Expectation<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expectation")
            .field("target", &self.target)
            .field("matcher", &self.matcher.name())
            .field("weight", &self.weight)
            .finish()
    }
}

impl<I> Expectation<I> {
    /// Create an expectation with no selector and [`Weight::NONE`].
    pub fn new(target: Target, matcher: impl Matcher + 'static) -> Self {
        Self::with_shared(target, Arc::new(matcher))
    }

    /// Create an expectation around an already shared matcher.
    pub fn with_shared(target: Target, matcher: Arc<dyn Matcher>) -> Self {
        Self {
            target,
            matcher,
            selector: None,
            weight: Weight::NONE,
        }
    }

    /// Set the value selector.
    pub fn select<F>(mut self, selector: F) -> Self
    where
        F: Fn(&I) -> Option<Value> + Send + Sync + 'static,
    {
        self.selector = Some(Arc::new(selector));
        self
    }

    /// Set the weight.
    pub fn weight(mut self, weight: impl Into<Weight>) -> Self {
        self.weight = weight.into();
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn matcher(&self) -> &dyn Matcher {
        self.matcher.as_ref()
    }

    pub fn get_weight(&self) -> Weight {
        self.weight
    }
}

/// Why one expectation did not pass.
#[derive(Debug)]
pub enum Miss {
    /// The matcher ran and rejected the value.
    Mismatch(String),
    /// The matcher errored or panicked.
    Error(MatchError),
}

/// Diagnostic entry for one failing expectation.
#[derive(Debug)]
pub struct MismatchDetail {
    pub matcher: String,
    pub target: Target,
    pub miss: Miss,
}

impl MismatchDetail {
    /// Whether this entry comes from a matcher error rather than a rejection.
    pub fn is_error(&self) -> bool {
        matches!(self.miss, Miss::Error(_))
    }
}

impl fmt::Display for MismatchDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.miss {
            Miss::Mismatch(message) if message.is_empty() => {
                write!(f, "{}: {} did not match", self.target, self.matcher)
            }
            Miss::Mismatch(message) => {
                write!(f, "{}: {}: {}", self.target, self.matcher, message)
            }
            Miss::Error(err) => write!(f, "{}: {}", self.target, err),
        }
    }
}

/// Outcome of evaluating an expectation list against one request.
#[derive(Debug, Default)]
pub struct MatchResult {
    /// True iff every expectation passed.
    pub pass: bool,
    /// Sum of the weights of the passing expectations, saturating at `u32::MAX`.
    pub weight: u32,
    /// One entry per failing or erroring expectation, in list order.
    pub details: Vec<MismatchDetail>,
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pass {
            return write!(f, "matched (weight {})", self.weight);
        }
        writeln!(f, "did not match (weight {})", self.weight)?;
        for detail in &self.details {
            writeln!(f, "  - {detail}")?;
        }
        Ok(())
    }
}

/// Evaluate every expectation against `input`.
pub fn evaluate<I>(input: &I, expectations: &[Expectation<I>]) -> MatchResult {
    let mut result = MatchResult {
        pass: true,
        weight: 0,
        details: Vec::new(),
    };

    for exp in expectations {
        let value = exp.selector.as_ref().and_then(|select| select(input));

        let miss = match run_matcher(exp.matcher.as_ref(), value.as_ref()) {
            Ok(verdict) if verdict.pass => {
                result.weight = result.weight.saturating_add(exp.weight.0);
                continue;
            }
            Ok(verdict) => Miss::Mismatch(verdict.message),
            Err(err) => Miss::Error(err),
        };

        result.pass = false;
        result.details.push(MismatchDetail {
            matcher: exp.matcher.name().to_string(),
            target: exp.target.clone(),
            miss,
        });
    }

    result
}

fn run_matcher(matcher: &dyn Matcher, value: Option<&Value>) -> Result<Verdict, MatchError> {
    match panic::catch_unwind(AssertUnwindSafe(|| matcher.matches(value))) {
        Ok(Ok(verdict)) => Ok(verdict),
        Ok(Err(source)) => Err(MatchError::Failed {
            matcher: matcher.name().to_string(),
            source,
        }),
        Err(payload) => Err(MatchError::Panicked {
            matcher: matcher.name().to_string(),
            reason: panic_reason(payload.as_ref()),
        }),
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) struct Req {
        pub method: String,
        pub path: String,
    }

    pub(crate) fn req(method: &str, path: &str) -> Req {
        Req {
            method: method.to_string(),
            path: path.to_string(),
        }
    }

    pub(crate) fn always(pass: bool) -> impl Matcher {
        matcher_fn(if pass { "always" } else { "never" }, move |_| {
            Ok(if pass {
                Verdict::pass()
            } else {
                Verdict::fail("rejected")
            })
        })
    }

    pub(crate) fn equal_to(expected: &str) -> impl Matcher {
        let expected = json!(expected);
        matcher_fn("EqualTo", move |v| {
            Ok(match v {
                Some(actual) if *actual == expected => Verdict::pass(),
                other => Verdict::fail(format!("expected {expected}, got {other:?}")),
            })
        })
    }

    fn exp(pass: bool, weight: u32) -> Expectation<Req> {
        Expectation::new(Target::Request, always(pass)).weight(weight)
    }

    #[test]
    fn test_all_passing_sums_weights() {
        let result = evaluate(&req("GET", "/"), &[exp(true, 2), exp(true, 1), exp(true, 2)]);
        assert!(result.pass);
        assert_eq!(result.weight, 5);
        assert!(result.details.is_empty());
    }

    #[test]
    fn test_one_failure_keeps_passing_weight() {
        let result = evaluate(&req("GET", "/"), &[exp(true, 2), exp(false, 1), exp(true, 2)]);
        assert!(!result.pass);
        assert_eq!(result.weight, 4);
        assert_eq!(result.details.len(), 1);
    }

    #[test]
    fn test_weight_sum_saturates() {
        let result = evaluate(
            &req("GET", "/"),
            &[exp(true, u32::MAX), exp(true, u32::MAX), exp(false, 1)],
        );
        assert!(!result.pass);
        assert_eq!(result.weight, u32::MAX);
    }

    #[test]
    fn test_every_failure_is_reported() {
        let expectations = vec![exp(false, 1), exp(true, 1), exp(false, 1), exp(false, 3)];
        let result = evaluate(&req("GET", "/"), &expectations);
        assert!(!result.pass);
        assert_eq!(result.weight, 1);
        assert_eq!(result.details.len(), 3);
    }

    #[test]
    fn test_selector_feeds_matcher() {
        let expectations = vec![
            Expectation::new(Target::Method, equal_to("GET"))
                .select(|r: &Req| Some(json!(r.method)))
                .weight(Weight::HIGH),
            Expectation::new(Target::Url, equal_to("/users"))
                .select(|r: &Req| Some(json!(r.path)))
                .weight(Weight::REGULAR),
        ];

        let hit = evaluate(&req("GET", "/users"), &expectations);
        assert!(hit.pass);
        assert_eq!(hit.weight, 5);

        let miss = evaluate(&req("GET", "/posts"), &expectations);
        assert!(!miss.pass);
        assert_eq!(miss.weight, 3);
        assert_eq!(miss.details[0].target, Target::Url);
        assert!(miss.details[0].to_string().starts_with("url: EqualTo: expected"));
    }

    #[test]
    fn test_missing_selector_passes_none() {
        let seen_none = matcher_fn("IsNone", |v| {
            Ok(if v.is_none() {
                Verdict::pass()
            } else {
                Verdict::fail("value present")
            })
        });
        let result = evaluate(
            &req("GET", "/"),
            &[
                Expectation::new(Target::Body, seen_none),
                Expectation::new(Target::Body, equal_to("x")).select(|_: &Req| None),
            ],
        );
        assert!(!result.pass);
        assert_eq!(result.details.len(), 1);
    }

    #[test]
    fn test_panicking_matcher_is_contained() {
        let boom = matcher_fn("Boom", |_| -> Result<Verdict, BoxError> {
            panic!("kaboom");
        });
        let result = evaluate(
            &req("GET", "/"),
            &[
                Expectation::new(Target::Body, boom),
                exp(true, 2),
                exp(false, 1),
            ],
        );

        assert!(!result.pass);
        assert_eq!(result.weight, 2);
        assert_eq!(result.details.len(), 2);
        assert!(result.details[0].is_error());
        match &result.details[0].miss {
            Miss::Error(MatchError::Panicked { matcher, reason }) => {
                assert_eq!(matcher, "Boom");
                assert_eq!(reason, "kaboom");
            }
            other => panic!("expected panic detail, got {other:?}"),
        }
    }

    #[test]
    fn test_matcher_error_is_wrapped() {
        let failing = matcher_fn("Broken", |_| Err("bad input".into()));
        let result = evaluate(&req("GET", "/"), &[Expectation::new(Target::Body, failing)]);

        assert!(!result.pass);
        assert_eq!(
            result.details[0].to_string(),
            "body: Broken: error while matching. bad input"
        );
    }

    #[test]
    fn test_empty_expectations_match() {
        let result = evaluate::<Req>(&req("GET", "/"), &[]);
        assert!(result.pass);
        assert_eq!(result.weight, 0);
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::Header("x-id".into()).to_string(), "header(x-id)");
        assert_eq!(Target::Method.to_string(), "method");
        assert_eq!(Target::Custom("grpc.method".into()).to_string(), "grpc.method");
    }
}
