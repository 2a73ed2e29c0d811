//! Retrying HTTP transport.
//!
//! [`RetryingTransport`] wraps any cloneable `tower` service that executes one HTTP attempt
//! (`Request<Body>` in, `Response<Body>` out) and re-issues the request while its
//! [`RetryPolicy`] asks for it.
//!
//! Semantics:
//! - A request body is drained into memory once and replayed verbatim on every attempt.
//!   With [`prevent_retry_with_body`](RetryingTransport::prevent_retry_with_body) set, bodied
//!   requests are sent exactly once and the policy is never consulted.
//! - Every attempt, successful or not, is shown to the policy. The last result is returned
//!   unchanged once the policy stops.
//! - A response that is going to be retried has its body drained and dropped before the wait.
//!   A response handed back to the caller is never touched.
//! - While waiting between attempts the sequence can be cancelled by the request's
//!   [`CancellationToken`] extension or by [`RetryingTransport::cancel`]. An attempt already in
//!   flight always runs to completion.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use http::{Request, Response, StatusCode};
//! use retrans::{Body, Delay, InstantSleeper, RetryStatus5xx, RetryingTransport};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let calls = Arc::new(AtomicUsize::new(0));
//! let counter = calls.clone();
//! let executor = tower::service_fn(move |_req: Request<Body>| {
//!     let n = counter.fetch_add(1, Ordering::SeqCst);
//!     async move {
//!         let status = if n == 0 { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };
//!         Ok::<_, std::io::Error>(Response::builder().status(status).body(Body::empty()).unwrap())
//!     }
//! });
//!
//! let transport = RetryingTransport::new(executor, RetryStatus5xx::new(3), Delay::constant(Duration::from_secs(1)))
//!     .with_sleeper(InstantSleeper);
//! let res = transport.execute(Request::get("http://example.com/").body(Body::empty()).unwrap()).await.unwrap();
//! assert_eq!(res.status(), StatusCode::OK);
//! assert_eq!(calls.load(Ordering::SeqCst), 2);
//! # });
//! ```

use crate::{
    Attempt, Body, CancelReason, CancellationRegistry, DelayStrategy, Error, Registration,
    ReplayBody, RequestId, RetryDecision, RetryPolicy, ShouldRetry, Sleeper, TokioSleeper,
};
use futures::future::BoxFuture;
use http::{Request, Response};
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;
use tracing::{debug, info, trace};

/// Wraps an attempt executor with retry, body replay, and cancellation.
pub struct RetryingTransport<S, E> {
    inner: S,
    policy: RetryPolicy<E>,
    sleeper: Arc<dyn Sleeper>,
    registry: Arc<CancellationRegistry>,
    prevent_retry_with_body: bool,
}

impl<S, E> RetryingTransport<S, E> {
    /// Wrap `inner`, retrying when `should_retry` agrees and waiting `delay` in between.
    pub fn new<C, D>(inner: S, should_retry: C, delay: D) -> Self
    where
        C: ShouldRetry<E> + 'static,
        D: DelayStrategy<E> + 'static,
    {
        Self::from_policy(inner, RetryPolicy::new(should_retry, delay))
    }

    /// Wrap `inner` with an already composed policy.
    pub fn from_policy(inner: S, policy: RetryPolicy<E>) -> Self {
        Self {
            inner,
            policy,
            sleeper: Arc::new(TokioSleeper),
            registry: Arc::new(CancellationRegistry::new()),
            prevent_retry_with_body: false,
        }
    }

    /// Send requests that carry a body exactly once instead of buffering them for replay.
    pub fn prevent_retry_with_body(mut self, prevent: bool) -> Self {
        self.prevent_retry_with_body = prevent;
        self
    }

    /// Replace the sleeper used between attempts.
    pub fn with_sleeper<T>(mut self, sleeper: T) -> Self
    where
        T: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Share a cancellation registry with other transports.
    pub fn with_registry(mut self, registry: Arc<CancellationRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn policy(&self) -> &RetryPolicy<E> {
        &self.policy
    }

    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    /// Borrow the wrapped executor.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Number of requests currently inside a retry sequence.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Stop the retry sequence of request `id` at its next wait. Returns `false` if the request
    /// is not in flight.
    ///
    /// An attempt already running is not interrupted. The request's [`CancellationToken`]
    /// extension is passed through to the executor on every attempt; an executor that watches it
    /// is the only way to abort an attempt in flight.
    pub fn cancel(&self, id: &RequestId) -> bool {
        self.registry.cancel(id)
    }

    /// [`cancel`](Self::cancel) using the [`RequestId`] carried by `req`.
    pub fn cancel_request<B>(&self, req: &Request<B>) -> bool {
        RequestId::of(req).is_some_and(|id| self.cancel(&id))
    }
}

impl<S, E> RetryingTransport<S, E>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = E> + Clone,
{
    /// Run `req` through the retry loop.
    pub async fn execute(&self, req: Request<Body>) -> Result<Response<Body>, Error<E>> {
        self.session().run(req).await
    }

    fn session(&self) -> Session<S, E> {
        Session {
            inner: self.inner.clone(),
            policy: self.policy.clone(),
            sleeper: self.sleeper.clone(),
            registry: self.registry.clone(),
            prevent_retry_with_body: self.prevent_retry_with_body,
        }
    }
}

impl<S: Clone, E> Clone for RetryingTransport<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            policy: self.policy.clone(),
            sleeper: self.sleeper.clone(),
            registry: self.registry.clone(),
            prevent_retry_with_body: self.prevent_retry_with_body,
        }
    }
}

impl<S: fmt::Debug, E> fmt::Debug for RetryingTransport<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingTransport")
            .field("inner", &self.inner)
            .field("policy", &self.policy)
            .field("sleeper", &self.sleeper)
            .field("in_flight", &self.registry.len())
            .field("prevent_retry_with_body", &self.prevent_retry_with_body)
            .finish()
    }
}

/// Readiness is awaited per attempt on a clone of the inner service, so the transport itself is
/// always ready.
impl<S, E> Service<Request<Body>> for RetryingTransport<S, E>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = E> + Clone + Send + 'static,
    S::Future: Send,
    E: Send + Sync + 'static,
{
    type Response = Response<Body>;
    type Error = Error<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        Box::pin(self.session().run(req))
    }
}

/// Where the retry loop is.
enum Step<E> {
    /// Issue an attempt with this body.
    Attempt(Body),
    /// Ask the policy about the attempt's result.
    Decide(Result<Response<Body>, E>),
    /// Wait, then attempt again with the rewound body.
    Wait { delay: Duration, body: Body },
    /// Hand this to the caller.
    Return(Result<Response<Body>, Error<E>>),
}

/// State owned by a single call: never shared between requests.
struct Session<S, E> {
    inner: S,
    policy: RetryPolicy<E>,
    sleeper: Arc<dyn Sleeper>,
    registry: Arc<CancellationRegistry>,
    prevent_retry_with_body: bool,
}

impl<S, E> Session<S, E>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = E>,
{
    async fn run(mut self, req: Request<Body>) -> Result<Response<Body>, Error<E>> {
        let (mut parts, body) = req.into_parts();
        let id = match parts.extensions.get::<RequestId>() {
            Some(id) => *id,
            None => {
                let id = RequestId::new();
                parts.extensions.insert(id);
                id
            }
        };
        let caller = parts.extensions.get::<CancellationToken>().cloned().unwrap_or_default();
        let registration = self.registry.register(id);
        let head = Request::from_parts(parts, ());

        let bodied = !body.is_empty();
        let retry_disabled = bodied && self.prevent_retry_with_body;
        let mut replay = None;
        let body = if bodied && !retry_disabled {
            let buffer = match ReplayBody::capture(body).await {
                Ok(buffer) => buffer,
                Err(err) => return Err(Error::Buffering(err)),
            };
            let first = buffer.body();
            replay = Some(buffer);
            first
        } else {
            body
        };

        let mut index = 0;
        let mut step = Step::Attempt(body);
        loop {
            step = match step {
                Step::Attempt(body) => {
                    trace!(target: "retrans::transport", request_id = %id, attempt = index, "attempt");
                    Step::Decide(self.attempt(&head, body).await)
                }
                Step::Decide(result) if retry_disabled => Step::Return(result.map_err(Error::Executor)),
                Step::Decide(result) => match self.decide(index, &head, &result) {
                    RetryDecision::Stop => Step::Return(result.map_err(Error::Executor)),
                    RetryDecision::Retry(delay) => {
                        if let Ok(response) = result {
                            discard(id, response).await;
                        }
                        let body = replay.as_mut().map(ReplayBody::rewind).unwrap_or_default();
                        Step::Wait { delay, body }
                    }
                },
                Step::Wait { delay, body } => {
                    debug!(target: "retrans::transport", request_id = %id, attempt = index, ?delay, "retry scheduled");
                    match wait(self.sleeper.as_ref(), delay, &caller, &registration).await {
                        Some(reason) => {
                            info!(target: "retrans::transport", request_id = %id, attempt = index, %reason, "retry sequence cancelled");
                            Step::Return(Err(Error::Cancelled { id, reason }))
                        }
                        None => {
                            index += 1;
                            Step::Attempt(body)
                        }
                    }
                }
                Step::Return(result) => return result,
            };
        }
    }

    async fn attempt(&mut self, head: &Request<()>, body: Body) -> Result<Response<Body>, E> {
        let (parts, ()) = head.clone().into_parts();
        let req = Request::from_parts(parts, body);
        self.inner.ready().await?.call(req).await
    }

    fn decide(
        &self,
        index: usize,
        head: &Request<()>,
        result: &Result<Response<Body>, E>,
    ) -> RetryDecision {
        self.policy.decide(&Attempt::new(index, head, result.as_ref()))
    }
}

/// Drain a response that is about to be retried so the executor can reuse its connection.
async fn discard(id: RequestId, response: Response<Body>) {
    if let Err(err) = response.into_body().drain().await {
        debug!(target: "retrans::transport", request_id = %id, error = %err, "failed to drain discarded response");
    }
}

/// Sleep for `delay` unless one of the cancellation signals fires first.
async fn wait(
    sleeper: &dyn Sleeper,
    delay: Duration,
    caller: &CancellationToken,
    registration: &Registration,
) -> Option<CancelReason> {
    tokio::select! {
        biased;
        _ = caller.cancelled() => Some(CancelReason::Caller),
        _ = registration.cancelled() => Some(CancelReason::Explicit),
        _ = sleeper.sleep(delay) => None,
    }
}

/// Tower layer producing [`RetryingTransport`]s that share one policy and one registry.
pub struct RetryLayer<E> {
    policy: RetryPolicy<E>,
    sleeper: Arc<dyn Sleeper>,
    registry: Arc<CancellationRegistry>,
    prevent_retry_with_body: bool,
}

impl<E> RetryLayer<E> {
    pub fn new<C, D>(should_retry: C, delay: D) -> Self
    where
        C: ShouldRetry<E> + 'static,
        D: DelayStrategy<E> + 'static,
    {
        Self::from_policy(RetryPolicy::new(should_retry, delay))
    }

    pub fn from_policy(policy: RetryPolicy<E>) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
            registry: Arc::new(CancellationRegistry::new()),
            prevent_retry_with_body: false,
        }
    }

    /// See [`RetryingTransport::prevent_retry_with_body`].
    pub fn prevent_retry_with_body(mut self, prevent: bool) -> Self {
        self.prevent_retry_with_body = prevent;
        self
    }

    pub fn with_sleeper<T>(mut self, sleeper: T) -> Self
    where
        T: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_registry(mut self, registry: Arc<CancellationRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Registry shared by every service this layer builds.
    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }
}

impl<E> Clone for RetryLayer<E> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            sleeper: self.sleeper.clone(),
            registry: self.registry.clone(),
            prevent_retry_with_body: self.prevent_retry_with_body,
        }
    }
}

impl<E> fmt::Debug for RetryLayer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryLayer")
            .field("policy", &self.policy)
            .field("sleeper", &self.sleeper)
            .field("prevent_retry_with_body", &self.prevent_retry_with_body)
            .finish()
    }
}

impl<S, E> Layer<S> for RetryLayer<E> {
    type Service = RetryingTransport<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryingTransport {
            inner,
            policy: self.policy.clone(),
            sleeper: self.sleeper.clone(),
            registry: self.registry.clone(),
            prevent_retry_with_body: self.prevent_retry_with_body,
        }
    }
}
