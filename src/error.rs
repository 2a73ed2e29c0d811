//! Error types returned by the retrying transport.
//!
//! Only three things ever reach the caller:
//! - [`Error::Buffering`]: the request body could not be read, no attempt was made.
//! - [`Error::Cancelled`]: the sequence was cancelled while waiting between attempts.
//! - [`Error::Executor`]: the last attempt's error, untouched.
//!
//! Errors from earlier attempts are consumed by the retry conditions and never surface.

use crate::RequestId;
use std::fmt;
use std::io;

/// Error returned by [`RetryingTransport`](crate::RetryingTransport).
#[derive(Debug, thiserror::Error)]
pub enum Error<E> {
    /// Draining the original request body failed; the body is unrecoverable.
    #[error("failed to buffer request body for replay: {0}")]
    Buffering(#[source] io::Error),
    /// The request was cancelled while waiting for its next attempt.
    #[error("request {id} canceled while waiting to retry ({reason})")]
    Cancelled { id: RequestId, reason: CancelReason },
    /// The wrapped executor failed on the final attempt.
    #[error(transparent)]
    Executor(E),
}

/// Which signal stopped a retry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The `CancellationToken` attached to the request fired.
    Caller,
    /// [`RetryingTransport::cancel`](crate::RetryingTransport::cancel) was called for the request.
    Explicit,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Caller => f.write_str("caller token"),
            CancelReason::Explicit => f.write_str("explicit cancel"),
        }
    }
}

impl<E> Error<E> {
    /// True for [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// True for [`Error::Buffering`].
    pub fn is_buffering(&self) -> bool {
        matches!(self, Self::Buffering(_))
    }

    /// Borrow the executor error if present.
    pub fn as_executor(&self) -> Option<&E> {
        match self {
            Self::Executor(e) => Some(e),
            _ => None,
        }
    }

    /// Take the executor error if present.
    pub fn into_executor(self) -> Option<E> {
        match self {
            Self::Executor(e) => Some(e),
            _ => None,
        }
    }

    /// Cancellation details as `(id, reason)`.
    pub fn cancel_details(&self) -> Option<(&RequestId, CancelReason)> {
        match self {
            Self::Cancelled { id, reason } => Some((id, *reason)),
            _ => None,
        }
    }
}

/// Errors that can report whether the condition behind them is likely transient.
///
/// Consumed by [`RetryTemporaryErr`](crate::RetryTemporaryErr).
pub trait Temporary {
    /// True if retrying the same request may succeed.
    fn is_temporary(&self) -> bool;
}

impl Temporary for io::Error {
    fn is_temporary(&self) -> bool {
        matches!(
            self.kind(),
            io::ErrorKind::TimedOut
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
        )
    }
}

/// Walks the source chain looking for an `io::Error`.
impl Temporary for Box<dyn std::error::Error + Send + Sync> {
    fn is_temporary(&self) -> bool {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self.as_ref());
        while let Some(err) = current {
            if let Some(io_err) = err.downcast_ref::<io::Error>() {
                return io_err.is_temporary();
            }
            current = err.source();
        }
        false
    }
}

impl<E: Temporary> Temporary for Error<E> {
    fn is_temporary(&self) -> bool {
        match self {
            Self::Executor(e) => e.is_temporary(),
            Self::Buffering(_) | Self::Cancelled { .. } => false,
        }
    }
}
