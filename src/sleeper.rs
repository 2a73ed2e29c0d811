//! How the transport waits between attempts.
//!
//! The retry loop races the sleeper future against cancellation, so a sleeper only needs to
//! resolve once the delay has elapsed. Tests swap in [`InstantSleeper`] or [`RecordingSleeper`]
//! to skip real waiting.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Future returned by [`Sleeper::sleep`].
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Waits out the delay chosen by the retry policy.
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    fn sleep(&self, delay: Duration) -> SleepFuture;
}

/// Sleeps on the tokio timer. Used unless another sleeper is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, delay: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(delay))
    }
}

/// Resolves immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _delay: Duration) -> SleepFuture {
        Box::pin(std::future::ready(()))
    }
}

/// Resolves immediately and remembers every requested delay.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, oldest first.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of waits requested.
    pub fn count(&self) -> usize {
        self.delays.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) -> SleepFuture {
        self.delays.lock().unwrap_or_else(PoisonError::into_inner).push(delay);
        Box::pin(std::future::ready(()))
    }
}
