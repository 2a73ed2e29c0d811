//! Ready-made retry conditions for common HTTP workloads.
//!
//! - [`idempotent`]: idempotent methods only, on transient errors or 5xx responses.
//! - [`transient`]: any method, on transient errors or 5xx responses.
//!
//! ```rust
//! use std::time::Duration;
//! use retrans::{presets, Delay, RetryLayer};
//!
//! let layer: RetryLayer<std::io::Error> = RetryLayer::new(
//!     presets::idempotent(3),
//!     Delay::exponential(Duration::from_millis(100), Duration::from_secs(5)),
//! );
//! # let _ = layer;
//! ```

use crate::{
    RetryAll, RetryAny, RetryHttpMethods, RetryStatus5xx, RetryTemporaryErr, ShouldRetryExt,
    Temporary,
};

/// Methods that are safe to send more than once.
pub const IDEMPOTENT_METHODS: [&str; 6] = ["GET", "HEAD", "OPTIONS", "PUT", "DELETE", "TRACE"];

/// Retry idempotent requests that hit a transient error or a 5xx response.
pub fn idempotent<E>(max_retries: usize) -> RetryAll<E>
where
    E: Temporary + 'static,
{
    RetryHttpMethods::new(max_retries, IDEMPOTENT_METHODS).and(transient::<E>(max_retries))
}

/// Retry any request that hit a transient error or a 5xx response.
pub fn transient<E>(max_retries: usize) -> RetryAny<E>
where
    E: Temporary + 'static,
{
    RetryTemporaryErr::new(max_retries).or(RetryStatus5xx::new(max_retries))
}
