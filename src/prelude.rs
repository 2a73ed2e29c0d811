//! Convenient re-exports for building retrying transports.
pub use crate::{
    condition::{
        RetryAll, RetryAny, RetryHttpMethods, RetryIsErr, RetryStatus5xx, RetryStatuses,
        RetryTemporaryErr, ShouldRetry, ShouldRetryExt,
    },
    delay::{Delay, DelayStrategy},
    presets, Attempt, Body, CancelReason, Error, RequestId, RetryLayer, RetryPolicy,
    RetryingTransport, Temporary,
};
pub use tokio_util::sync::CancellationToken;
