//! Snapshot of a single attempt, handed to retry conditions and delay strategies.

use crate::Body;
use http::{Request, Response};

/// Inputs and outcome of one attempt against the wrapped executor.
///
/// `index` starts at 0 for the initial call and grows by one per retry. Exactly one of
/// [`response`](Attempt::response) / [`error`](Attempt::error) is present: the record is built
/// from the executor's `Result`, so "neither" cannot be represented. A non-2xx status is a
/// response, not an error.
pub struct Attempt<'a, E> {
    index: usize,
    request: &'a Request<()>,
    outcome: Result<&'a Response<Body>, &'a E>,
}

impl<'a, E> Attempt<'a, E> {
    /// Record the outcome of attempt `index` for `request`.
    pub fn new(
        index: usize,
        request: &'a Request<()>,
        outcome: Result<&'a Response<Body>, &'a E>,
    ) -> Self {
        Self { index, request, outcome }
    }

    /// Zero-based attempt number.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Head of the request as issued for this attempt. The body is owned by the executor.
    pub fn request(&self) -> &'a Request<()> {
        self.request
    }

    /// Response, if the attempt produced one.
    pub fn response(&self) -> Option<&'a Response<Body>> {
        self.outcome.ok()
    }

    /// Transport-level error, if the attempt failed before producing a response.
    pub fn error(&self) -> Option<&'a E> {
        self.outcome.err()
    }

    /// Borrow the raw outcome.
    pub fn outcome(&self) -> Result<&'a Response<Body>, &'a E> {
        self.outcome
    }
}

impl<E> Clone for Attempt<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Attempt<'_, E> {}

impl<E: std::fmt::Debug> std::fmt::Debug for Attempt<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attempt")
            .field("index", &self.index)
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("status", &self.response().map(|r| r.status()))
            .field("error", &self.error())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::io;

    #[test]
    fn response_outcome_has_no_error() {
        let req = Request::get("http://localhost/").body(()).unwrap();
        let res = Response::builder().status(StatusCode::BAD_GATEWAY).body(Body::empty()).unwrap();
        let attempt: Attempt<'_, io::Error> = Attempt::new(2, &req, Ok(&res));

        assert_eq!(attempt.index(), 2);
        assert_eq!(attempt.response().map(|r| r.status()), Some(StatusCode::BAD_GATEWAY));
        assert!(attempt.error().is_none());
    }

    #[test]
    fn error_outcome_has_no_response() {
        let req = Request::post("http://localhost/upload").body(()).unwrap();
        let err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let attempt = Attempt::new(0, &req, Err(&err));

        assert!(attempt.response().is_none());
        assert_eq!(attempt.error().map(io::Error::kind), Some(io::ErrorKind::ConnectionReset));
        assert_eq!(attempt.request().method(), http::Method::POST);

        let copy = attempt;
        let debug = format!("{:?}", copy);
        assert!(debug.contains("POST"));
        assert!(debug.contains("index: 0"));
    }
}
