//! mockcore
//!
//! Protocol-agnostic core of a programmable mock server. Transport adapters
//! turn their native requests into an input value, ask the engine which
//! registered mock answers it, and render that mock's reply.
//!
//! # Features
//!
//! - **Expectations**: Select a value from the request and judge it with any [`Matcher`]
//! - **Dispatch**: First full match in priority order wins; misses report the closest mock
//! - **Scopes**: Assert on exactly the mocks registered together
//! - **Scenarios**: Order mocks with named, atomically advanced state machines
//! - **Serve limits**: Retire a mock after it was served a number of times
//! - **Pipelines**: Stream reply bodies through concurrent transformation stages
//!
//! # Example
//!
//! ```no_run
//! use mockcore::{Expectation, HttpReply, Mock, MockServer, Target, Weight};
//! use serde_json::json;
//!
//! struct Request {
//!     path: String,
//! }
//!
//! let server = MockServer::default();
//! let scope = server
//!     .mock([Mock::builder()
//!         .name("hello")
//!         .expect(
//!             Expectation::new(
//!                 Target::Url,
//!                 mockcore::matcher_fn("EqualTo", |v| {
//!                     Ok(if v == Some(&json!("/hello")) {
//!                         mockcore::Verdict::pass()
//!                     } else {
//!                         mockcore::Verdict::fail("path differs")
//!                     })
//!                 }),
//!             )
//!             .select(|r: &Request| Some(json!(r.path)))
//!             .weight(Weight::REGULAR),
//!         )
//!         .reply(HttpReply::ok().body("Hello, World!"))])
//!     .unwrap();
//!
//! let dispatch = server.dispatch(&Request { path: "/hello".into() });
//! assert!(dispatch.is_matched());
//! assert!(scope.assert_called(&mockcore::LogNotifier));
//! ```
//!
//! # Example Configuration
//!
//! ```yaml
//! settings:
//!   log_matches: true
//!   log_unmatched: true
//!   not_matched_status: 418
//! pipeline:
//!   channel_capacity: 1
//! ```

pub mod config;
pub mod error;
pub mod expect;
pub mod finder;
pub mod mock;
pub mod params;
pub mod pipe;
pub mod registry;
pub mod repeat;
pub mod reply;
pub mod scenario;
pub mod scope;
pub mod server;

pub use config::EngineConfig;
pub use error::{BuildError, MatchError, PipeError, ReplyError};
pub use expect::{matcher_fn, Expectation, Matcher, Target, Verdict, Weight};
pub use finder::{find_mock_for_request, FindResult};
pub use mock::{Mock, MockBuilder};
pub use params::Params;
pub use pipe::{map_pipe, Chunk, Conduit, Connector, Pipe};
pub use registry::MockRegistry;
pub use repeat::RepeatMatcher;
pub use reply::{HttpReply, Reply, ReplyKind, StreamReply, UnaryReply};
pub use scenario::{ScenarioMatcher, ScenarioStore, SCENARIO_STARTED};
pub use scope::{LogNotifier, Notifier, RecordingNotifier, Scope};
pub use server::{Dispatch, MockServer, NoMatch, ServerStats};
