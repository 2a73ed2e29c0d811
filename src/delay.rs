//! Delay strategies applied between attempts.
//!
//! Attempt semantics: the delay is computed from the attempt that just failed, so index `0`
//! yields the wait before the first retry.
//!
//! - [`Delay::none`]: always zero.
//! - [`Delay::constant`]: the same wait regardless of index.
//! - [`Delay::linear`]: `base * (index + 1)`.
//! - [`Delay::exponential`]: full jitter, uniform in `[0, min(max, base * 2^index))`.
//!
//! Any `Fn(&Attempt<'_, E>) -> Duration` is also a strategy.
//!
//! ```rust
//! use std::time::Duration;
//! use retrans::{Attempt, Body, Delay, DelayStrategy};
//!
//! let req = http::Request::get("http://example.com/").body(()).unwrap();
//! let res = http::Response::new(Body::empty());
//! let attempt: Attempt<'_, std::io::Error> = Attempt::new(2, &req, Ok(&res));
//!
//! assert_eq!(Delay::linear(Duration::from_millis(100)).delay(&attempt), Duration::from_millis(300));
//! let jittered = Delay::exponential(Duration::from_millis(100), Duration::from_secs(1)).delay(&attempt);
//! assert!(jittered < Duration::from_millis(400));
//! ```
//!
//! Overflow behavior: linear products that do not fit in a `Duration` saturate to [`MAX_DELAY`].

use crate::Attempt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Delay used when a linear computation overflows (1 day).
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Computes the wait before the next attempt.
pub trait DelayStrategy<E>: Send + Sync {
    fn delay(&self, attempt: &Attempt<'_, E>) -> Duration;
}

impl<E, F> DelayStrategy<E> for F
where
    F: Fn(&Attempt<'_, E>) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: &Attempt<'_, E>) -> Duration {
        self(attempt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinearDelay {
    base: Duration,
}

impl LinearDelay {
    fn delay(&self, index: usize) -> Duration {
        let factor = index.saturating_add(1).min(u32::MAX as usize) as u32;
        self.base.checked_mul(factor).unwrap_or(MAX_DELAY)
    }
}

/// Shared generator used when a seed is supplied.
#[derive(Clone)]
struct SeededRng(Arc<Mutex<StdRng>>);

impl fmt::Debug for SeededRng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SeededRng")
    }
}

#[derive(Debug, Clone)]
struct ExponentialDelay {
    base: Duration,
    max: Duration,
    rng: Option<SeededRng>,
}

impl ExponentialDelay {
    /// Upper bound (exclusive) of the jitter window in nanoseconds.
    fn ceiling_nanos(&self, index: usize) -> u64 {
        if self.base.is_zero() || self.max.is_zero() {
            return 0;
        }
        let exponent = index.min(i32::MAX as usize) as i32;
        let top = self.base.as_nanos() as f64 * 2f64.powi(exponent);
        let ceiling = top.min(self.max.as_nanos() as f64);
        if ceiling.is_nan() || ceiling < 1.0 {
            0
        } else if ceiling >= u64::MAX as f64 {
            u64::MAX
        } else {
            ceiling as u64
        }
    }

    fn delay(&self, index: usize) -> Duration {
        let ceiling = self.ceiling_nanos(index);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        let nanos = match &self.rng {
            Some(SeededRng(shared)) => {
                shared.lock().unwrap_or_else(PoisonError::into_inner).random_range(0..ceiling)
            }
            None => rand::rng().random_range(0..ceiling),
        };
        Duration::from_nanos(nanos)
    }
}

#[derive(Debug, Clone)]
enum DelayKind {
    None,
    Constant(Duration),
    Linear(LinearDelay),
    Exponential(ExponentialDelay),
}

/// Built-in delay strategies.
#[derive(Debug, Clone)]
pub struct Delay {
    kind: DelayKind,
}

impl Delay {
    /// Retry immediately.
    pub fn none() -> Self {
        Self { kind: DelayKind::None }
    }

    /// Wait `delay` before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: DelayKind::Constant(delay) }
    }

    /// Wait `base * (index + 1)`.
    pub fn linear(base: Duration) -> Self {
        Self { kind: DelayKind::Linear(LinearDelay { base }) }
    }

    /// Full-jitter exponential backoff: uniform in `[0, min(max, base * 2^index))`.
    ///
    /// A zero `base` or `max` always yields zero. Jitter comes from `rand`'s thread-local
    /// generator unless [`with_seed`](Delay::with_seed) is used.
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self { kind: DelayKind::Exponential(ExponentialDelay { base, max, rng: None }) }
    }

    /// Draw exponential jitter from a seeded generator shared by every clone of this value.
    /// No effect on other strategies.
    pub fn with_seed(mut self, seed: u64) -> Self {
        if let DelayKind::Exponential(exp) = &mut self.kind {
            exp.rng = Some(SeededRng(Arc::new(Mutex::new(StdRng::seed_from_u64(seed)))));
        }
        self
    }

    /// Delay before the retry that follows attempt `index`.
    pub fn delay_for(&self, index: usize) -> Duration {
        match &self.kind {
            DelayKind::None => Duration::ZERO,
            DelayKind::Constant(d) => *d,
            DelayKind::Linear(l) => l.delay(index),
            DelayKind::Exponential(e) => e.delay(index),
        }
    }
}

impl<E> DelayStrategy<E> for Delay {
    fn delay(&self, attempt: &Attempt<'_, E>) -> Duration {
        self.delay_for(attempt.index())
    }
}
