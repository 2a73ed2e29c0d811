#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # retrans
//!
//! Retrying HTTP transport for async Rust: wrap any `tower` service that executes a single HTTP
//! attempt and get transparent retries with body replay, pluggable retry conditions, jittered
//! delays, and cooperative cancellation.
//!
//! ## Features
//!
//! - **Retry conditions**: temporary errors, 5xx and explicit statuses, method allow-lists,
//!   custom predicates, combined with `RetryAny` / `RetryAll`
//! - **Delay strategies**: none, constant, linear, full-jitter exponential
//! - **Body replay**: request bodies are buffered once and resent verbatim on every attempt
//! - **Cancellation** between attempts via request-scoped `CancellationToken`s or by request id
//! - **Tower integration** through [`RetryLayer`]
//! - **Declarative config** with serde (feature `config`)
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use http::{Request, Response};
//! use retrans::{Body, Delay, RetryHttpMethods, RetryStatus5xx, RetryingTransport, ShouldRetryExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let executor = tower::service_fn(|_req: Request<Body>| async {
//!     Ok::<_, std::io::Error>(Response::new(Body::from("hello")))
//! });
//!
//! let transport = RetryingTransport::new(
//!     executor,
//!     RetryStatus5xx::new(3).and(RetryHttpMethods::new(3, ["GET"])),
//!     Delay::exponential(Duration::from_millis(50), Duration::from_secs(2)),
//! );
//!
//! let res = transport
//!     .execute(Request::get("http://example.com/").body(Body::empty()).unwrap())
//!     .await
//!     .unwrap();
//! assert_eq!(res.into_body().collect().await.unwrap(), "hello");
//! # });
//! ```

pub mod attempt;
pub mod body;
pub mod condition;
#[cfg(feature = "config")]
pub mod config;
pub mod delay;
pub mod error;
pub mod policy;
pub mod prelude;
pub mod presets;
pub mod registry;
pub mod sleeper;
pub mod transport;

// Re-exports
pub use attempt::Attempt;
pub use body::{Body, ReplayBody};
pub use condition::{
    RetryAll, RetryAny, RetryHttpMethods, RetryIsErr, RetryStatus5xx, RetryStatuses,
    RetryTemporaryErr, ShouldRetry, ShouldRetryExt,
};
pub use delay::{Delay, DelayStrategy, MAX_DELAY};
pub use error::{CancelReason, Error, Temporary};
pub use policy::{RetryDecision, RetryPolicy};
pub use registry::{CancellationRegistry, Registration, RequestId};
pub use sleeper::{InstantSleeper, RecordingSleeper, SleepFuture, Sleeper, TokioSleeper};
pub use transport::{RetryLayer, RetryingTransport};
