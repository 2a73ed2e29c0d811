use http::{Request, Response, StatusCode};
use futures::future;
use retrans::{
    Attempt, Body, CancelReason, CancellationRegistry, Delay, RequestId, RetryStatus5xx,
    RetryingTransport, SleepFuture, Sleeper,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::Service;

const PATIENCE: Duration = Duration::from_secs(5);

/// Executor that always answers 503 and reports each attempt on `tx`.
#[derive(Clone)]
struct Unavailable {
    tx: mpsc::UnboundedSender<usize>,
    calls: Arc<AtomicUsize>,
}

impl Service<Request<Body>> for Unavailable {
    type Response = Response<Body>;
    type Error = io::Error;
    type Future = future::Ready<Result<Response<Body>, io::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Request<Body>) -> Self::Future {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(n);
        future::ready(Ok(Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .body(Body::empty())
            .unwrap()))
    }
}

fn unavailable(tx: mpsc::UnboundedSender<usize>, calls: Arc<AtomicUsize>) -> Unavailable {
    Unavailable { tx, calls }
}

/// Reports every wait on `entered`; zero delays resolve at once, anything else never does.
#[derive(Debug, Clone)]
struct GatedSleeper {
    entered: mpsc::UnboundedSender<Duration>,
}

impl Sleeper for GatedSleeper {
    fn sleep(&self, delay: Duration) -> SleepFuture {
        let _ = self.entered.send(delay);
        if delay.is_zero() {
            Box::pin(future::ready(()))
        } else {
            Box::pin(future::pending::<()>())
        }
    }
}

/// No pause after the first attempt, then an hour before the third.
fn stall_after_second(attempt: &Attempt<'_, io::Error>) -> Duration {
    if attempt.index() == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs(3600)
    }
}

#[tokio::test]
async fn explicit_cancel_stops_waiting_sequence() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (entered_tx, mut entered) = mpsc::unbounded_channel();
    let calls = Arc::new(AtomicUsize::new(0));
    let transport = RetryingTransport::new(
        unavailable(tx, calls.clone()),
        RetryStatus5xx::new(5),
        stall_after_second,
    )
    .with_sleeper(GatedSleeper { entered: entered_tx });

    let id = RequestId::new();
    let mut req = Request::get("http://upstream/report").body(Body::empty()).unwrap();
    req.extensions_mut().insert(id);

    let task = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.execute(req).await })
    };

    assert_eq!(rx.recv().await, Some(0));
    assert_eq!(entered.recv().await, Some(Duration::ZERO));
    assert_eq!(rx.recv().await, Some(1));
    // the sequence is now parked between attempt 1 and attempt 2
    assert_eq!(entered.recv().await, Some(Duration::from_secs(3600)));
    assert!(transport.cancel(&id), "request should still be registered");

    let err = tokio::time::timeout(PATIENCE, task).await.expect("cancel wakes the wait").unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.cancel_details(), Some((&id, CancelReason::Explicit)));
    assert_eq!(calls.load(Ordering::SeqCst), 2, "no attempt after cancellation");
    assert!(rx.try_recv().is_err());
    assert_eq!(transport.in_flight(), 0);
    assert!(!transport.cancel(&id), "entry removed once cancelled");
}

#[tokio::test]
async fn caller_token_cancels_waiting_sequence() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let calls = Arc::new(AtomicUsize::new(0));
    let transport = RetryingTransport::new(
        unavailable(tx, calls.clone()),
        RetryStatus5xx::new(5),
        Delay::constant(Duration::from_secs(3600)),
    );

    let token = CancellationToken::new();
    let mut req = Request::get("http://upstream/report").body(Body::empty()).unwrap();
    req.extensions_mut().insert(token.clone());

    let task = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.execute(req).await })
    };

    assert_eq!(rx.recv().await, Some(0));
    token.cancel();

    let err = tokio::time::timeout(PATIENCE, task).await.expect("token wakes the wait").unwrap().unwrap_err();
    let (_, reason) = err.cancel_details().expect("cancelled");
    assert_eq!(reason, CancelReason::Caller);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.in_flight(), 0);
}

#[tokio::test]
async fn cancelling_before_first_wait_prevents_any_retry() {
    let token = CancellationToken::new();
    token.cancel();
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, _rx) = mpsc::unbounded_channel();
    let transport = RetryingTransport::new(unavailable(tx, calls.clone()), RetryStatus5xx::new(3), Delay::none());

    let mut req = Request::get("http://upstream/").body(Body::empty()).unwrap();
    req.extensions_mut().insert(token);

    let err = transport.execute(req).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 1, "the first attempt is always made");
}

#[tokio::test]
async fn unknown_id_cannot_be_cancelled() {
    let registry = Arc::new(CancellationRegistry::new());
    let (tx, _rx) = mpsc::unbounded_channel();
    let transport = RetryingTransport::new(
        unavailable(tx, Arc::new(AtomicUsize::new(0))),
        RetryStatus5xx::new(0),
        Delay::none(),
    )
    .with_registry(registry.clone());

    assert!(!transport.cancel(&RequestId::new()));

    let res = transport.execute(Request::get("http://upstream/").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn transports_sharing_a_registry_cancel_each_other() {
    let registry = Arc::new(CancellationRegistry::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let busy = RetryingTransport::new(
        unavailable(tx, Arc::new(AtomicUsize::new(0))),
        RetryStatus5xx::new(5),
        Delay::constant(Duration::from_secs(3600)),
    )
    .with_registry(registry.clone());
    let (idle_tx, _idle_rx) = mpsc::unbounded_channel();
    let admin: RetryingTransport<_, io::Error> = RetryingTransport::new(
        unavailable(idle_tx, Arc::new(AtomicUsize::new(0))),
        RetryStatus5xx::new(0),
        Delay::none(),
    )
    .with_registry(registry.clone());

    let mut req = Request::get("http://upstream/").body(Body::empty()).unwrap();
    let id = RequestId::get_or_insert(&mut req);
    let task = tokio::spawn(async move { busy.execute(req).await });

    assert_eq!(rx.recv().await, Some(0));
    assert_eq!(admin.in_flight(), 1);
    assert!(admin.cancel(&id));

    let err = tokio::time::timeout(PATIENCE, task).await.unwrap().unwrap().unwrap_err();
    assert_eq!(err.cancel_details(), Some((&id, CancelReason::Explicit)));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn caller_token_reaches_executor_to_abort_attempt_in_flight() {
    let executor = tower::service_fn(|req: Request<Body>| async move {
        let token = req.extensions().get::<CancellationToken>().cloned().expect("token forwarded");
        token.cancelled().await;
        Err::<Response<Body>, _>(io::Error::new(io::ErrorKind::Interrupted, "aborted by caller"))
    });
    let transport = RetryingTransport::new(executor, RetryStatus5xx::new(3), Delay::none());

    let token = CancellationToken::new();
    let mut req = Request::get("http://upstream/slow").body(Body::empty()).unwrap();
    req.extensions_mut().insert(token.clone());

    let task = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.execute(req).await })
    };
    tokio::task::yield_now().await;
    token.cancel();

    let err = tokio::time::timeout(PATIENCE, task).await.expect("attempt aborted").unwrap().unwrap_err();
    assert_eq!(err.as_executor().map(io::Error::kind), Some(io::ErrorKind::Interrupted));
    assert_eq!(transport.in_flight(), 0);
}
