//! Retry policy: one condition plus one delay strategy.
//!
//! The condition is always evaluated first; the delay strategy only runs for attempts that will
//! actually be retried, so a stopped sequence never consumes jitter.
//!
//! Policies hold no mutable state and are shared by every request going through a transport.

use crate::{Attempt, DelayStrategy, ShouldRetry};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of evaluating a [`RetryPolicy`] against an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the attempt's result back to the caller.
    Stop,
    /// Wait this long, then issue the next attempt.
    Retry(Duration),
}

impl RetryDecision {
    pub fn should_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry(_))
    }

    /// Delay before the next attempt; zero for [`RetryDecision::Stop`].
    pub fn delay(&self) -> Duration {
        match self {
            RetryDecision::Retry(d) => *d,
            RetryDecision::Stop => Duration::ZERO,
        }
    }
}

/// Combines a [`ShouldRetry`] condition with a [`DelayStrategy`].
pub struct RetryPolicy<E> {
    should_retry: Arc<dyn ShouldRetry<E>>,
    delay: Arc<dyn DelayStrategy<E>>,
}

impl<E> RetryPolicy<E> {
    pub fn new<C, D>(should_retry: C, delay: D) -> Self
    where
        C: ShouldRetry<E> + 'static,
        D: DelayStrategy<E> + 'static,
    {
        Self { should_retry: Arc::new(should_retry), delay: Arc::new(delay) }
    }

    /// Evaluate the policy for `attempt`.
    pub fn decide(&self, attempt: &Attempt<'_, E>) -> RetryDecision {
        if !self.should_retry.should_retry(attempt) {
            return RetryDecision::Stop;
        }
        RetryDecision::Retry(self.delay.delay(attempt))
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self { should_retry: self.should_retry.clone(), delay: self.delay.clone() }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("should_retry", &"<condition>")
            .field("delay", &"<delay>")
            .finish()
    }
}
