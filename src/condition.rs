//! Retry conditions: predicates deciding whether an attempt should be retried.
//!
//! Every built-in condition takes a `max_retries` bound and answers `false` once
//! `attempt.index() >= max_retries`. Conditions compose with [`RetryAny`] (logical OR) and
//! [`RetryAll`] (logical AND), or through [`ShouldRetryExt::or`] / [`ShouldRetryExt::and`].
//!
//! ```rust
//! use retrans::{RetryAll, RetryHttpMethods, RetryStatus5xx, RetryTemporaryErr, ShouldRetryExt};
//!
//! // Retry idempotent requests on 5xx or transient network errors, at most 3 times.
//! let condition: RetryAll<std::io::Error> = RetryHttpMethods::new(3, ["GET", "HEAD"])
//!     .and(RetryTemporaryErr::new(3).or(RetryStatus5xx::new(3)));
//! # let _ = condition;
//! ```
//!
//! [`RetryHttpMethods`] on its own retries every attempt made with a listed method, including
//! successful ones. Combine it with another condition through [`RetryAll`].

use crate::{Attempt, Temporary};
use http::StatusCode;
use std::fmt;
use std::sync::Arc;

/// Decides whether an attempt should be retried.
pub trait ShouldRetry<E>: Send + Sync {
    fn should_retry(&self, attempt: &Attempt<'_, E>) -> bool;
}

impl<E, F> ShouldRetry<E> for F
where
    F: Fn(&Attempt<'_, E>) -> bool + Send + Sync,
{
    fn should_retry(&self, attempt: &Attempt<'_, E>) -> bool {
        self(attempt)
    }
}

/// Retries errors reporting themselves as [`Temporary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTemporaryErr {
    max_retries: usize,
}

impl RetryTemporaryErr {
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries }
    }
}

impl<E: Temporary> ShouldRetry<E> for RetryTemporaryErr {
    fn should_retry(&self, attempt: &Attempt<'_, E>) -> bool {
        attempt.index() < self.max_retries && attempt.error().is_some_and(Temporary::is_temporary)
    }
}

/// Retries responses with a status in `500..600`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryStatus5xx {
    max_retries: usize,
}

impl RetryStatus5xx {
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries }
    }
}

impl<E> ShouldRetry<E> for RetryStatus5xx {
    fn should_retry(&self, attempt: &Attempt<'_, E>) -> bool {
        attempt.index() < self.max_retries
            && attempt.response().is_some_and(|r| r.status().is_server_error())
    }
}

/// Retries responses whose status is one of a fixed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStatuses {
    max_retries: usize,
    statuses: Vec<StatusCode>,
}

impl RetryStatuses {
    pub fn new(max_retries: usize, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        Self { max_retries, statuses: statuses.into_iter().collect() }
    }
}

impl<E> ShouldRetry<E> for RetryStatuses {
    fn should_retry(&self, attempt: &Attempt<'_, E>) -> bool {
        attempt.index() < self.max_retries
            && attempt.response().is_some_and(|r| self.statuses.contains(&r.status()))
    }
}

/// Retries any attempt whose request method is in the list, compared case-insensitively.
///
/// Used alone this also retries successful responses; pair it with another condition via
/// [`RetryAll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryHttpMethods {
    max_retries: usize,
    methods: Vec<String>,
}

impl RetryHttpMethods {
    pub fn new<I, M>(max_retries: usize, methods: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        let methods = methods.into_iter().map(|m| m.as_ref().to_ascii_uppercase()).collect();
        Self { max_retries, methods }
    }
}

impl<E> ShouldRetry<E> for RetryHttpMethods {
    fn should_retry(&self, attempt: &Attempt<'_, E>) -> bool {
        if attempt.index() >= self.max_retries {
            return false;
        }
        let method = attempt.request().method().as_str();
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}

/// Retries errors matching a predicate.
pub struct RetryIsErr<E> {
    max_retries: usize,
    predicate: Arc<dyn Fn(&E) -> bool + Send + Sync>,
}

impl<E> RetryIsErr<E> {
    pub fn new<F>(max_retries: usize, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self { max_retries, predicate: Arc::new(predicate) }
    }
}

impl<E> Clone for RetryIsErr<E> {
    fn clone(&self) -> Self {
        Self { max_retries: self.max_retries, predicate: self.predicate.clone() }
    }
}

impl<E> fmt::Debug for RetryIsErr<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryIsErr")
            .field("max_retries", &self.max_retries)
            .field("predicate", &"<predicate>")
            .finish()
    }
}

impl<E> ShouldRetry<E> for RetryIsErr<E> {
    fn should_retry(&self, attempt: &Attempt<'_, E>) -> bool {
        attempt.index() < self.max_retries && attempt.error().is_some_and(|e| (self.predicate)(e))
    }
}

/// Logical OR over its conditions. Empty: never retries.
pub struct RetryAny<E> {
    conditions: Vec<Arc<dyn ShouldRetry<E>>>,
}

/// Logical AND over its conditions. Empty: always retries.
pub struct RetryAll<E> {
    conditions: Vec<Arc<dyn ShouldRetry<E>>>,
}

macro_rules! combinator {
    ($name:ident, $label:literal) => {
        impl<E> $name<E> {
            /// Combinator with no conditions.
            pub fn new() -> Self {
                Self { conditions: Vec::new() }
            }

            /// Append a condition.
            pub fn with<C>(mut self, condition: C) -> Self
            where
                C: ShouldRetry<E> + 'static,
            {
                self.conditions.push(Arc::new(condition));
                self
            }

            /// Number of child conditions.
            pub fn len(&self) -> usize {
                self.conditions.len()
            }

            pub fn is_empty(&self) -> bool {
                self.conditions.is_empty()
            }
        }

        impl<E> Default for $name<E> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<E> Clone for $name<E> {
            fn clone(&self) -> Self {
                Self { conditions: self.conditions.clone() }
            }
        }

        impl<E> fmt::Debug for $name<E> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct($label).field("conditions", &self.conditions.len()).finish()
            }
        }

        impl<E> FromIterator<Arc<dyn ShouldRetry<E>>> for $name<E> {
            fn from_iter<I: IntoIterator<Item = Arc<dyn ShouldRetry<E>>>>(iter: I) -> Self {
                Self { conditions: iter.into_iter().collect() }
            }
        }
    };
}

combinator!(RetryAny, "RetryAny");
combinator!(RetryAll, "RetryAll");

impl<E> ShouldRetry<E> for RetryAny<E> {
    fn should_retry(&self, attempt: &Attempt<'_, E>) -> bool {
        self.conditions.iter().any(|c| c.should_retry(attempt))
    }
}

impl<E> ShouldRetry<E> for RetryAll<E> {
    fn should_retry(&self, attempt: &Attempt<'_, E>) -> bool {
        self.conditions.iter().all(|c| c.should_retry(attempt))
    }
}

/// Combinator sugar for every condition.
pub trait ShouldRetryExt<E>: ShouldRetry<E> + Sized + 'static {
    /// Retry only if both `self` and `other` agree.
    fn and<C: ShouldRetry<E> + 'static>(self, other: C) -> RetryAll<E> {
        RetryAll::new().with(self).with(other)
    }

    /// Retry if either `self` or `other` says so.
    fn or<C: ShouldRetry<E> + 'static>(self, other: C) -> RetryAny<E> {
        RetryAny::new().with(self).with(other)
    }
}

impl<E, T: ShouldRetry<E> + Sized + 'static> ShouldRetryExt<E> for T {}
