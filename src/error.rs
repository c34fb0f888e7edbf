//! Error types for the mock engine.
//!
//! A request that matches no mock is not an error; it is reported through
//! [`FindResult`](crate::finder::FindResult) instead.

use crate::reply::ReplyKind;
use thiserror::Error;

/// Boxed error returned by user matchers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A matcher could not produce a verdict.
#[derive(Error, Debug)]
pub enum MatchError {
    /// The matcher returned an error.
    #[error("{matcher}: error while matching. {source}")]
    Failed {
        /// Name of the failing matcher.
        matcher: String,
        /// Error returned by the matcher.
        #[source]
        source: BoxError,
    },

    /// The matcher panicked; the panic was caught at the engine boundary.
    #[error("panic: matcher={matcher}. {reason}")]
    Panicked {
        /// Name of the panicking matcher.
        matcher: String,
        /// Panic payload rendered as text.
        reason: String,
    },
}

/// The matched mock carries a reply for another protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("mock {mock} must implement a {expected} reply: got {found}")]
    Mismatch {
        mock: String,
        expected: ReplyKind,
        found: ReplyKind,
    },
}

/// A mock builder is missing required parts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("mock {0} has no reply")]
    MissingReply(String),

    #[error("scenario {0} has no store to run in")]
    NoScenarioStore(String),
}

/// The response pipeline failed to deliver its output.
#[derive(Error, Debug)]
pub enum PipeError {
    /// A stage task panicked or was cancelled; its output is incomplete.
    #[error("pipeline stage {stage} failed: {source}")]
    Stage {
        stage: usize,
        #[source]
        source: tokio::task::JoinError,
    },

    /// Writing to the destination failed after `written` bytes.
    #[error("pipeline write failed after {written} bytes: {source}")]
    Write {
        written: usize,
        #[source]
        source: std::io::Error,
    },
}
