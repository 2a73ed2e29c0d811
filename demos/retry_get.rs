//! Retry a flaky GET endpoint with full-jitter exponential backoff.
use http::{Request, Response, StatusCode};
use retrans::prelude::*;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Error<io::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    // Replace with a real HTTP client; this one fails twice before answering.
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let executor = tower::service_fn(move |req: Request<Body>| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            let status = if n < 2 { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };
            println!("{} {} -> {}", req.method(), req.uri(), status);
            Ok::<_, io::Error>(
                Response::builder()
                    .status(status)
                    .body(Body::from(format!("attempt {}", n + 1)))
                    .map_err(io::Error::other)?,
            )
        }
    });

    let transport = RetryingTransport::new(
        executor,
        RetryStatus5xx::new(3).and(RetryHttpMethods::new(3, ["GET"])),
        Delay::exponential(Duration::from_millis(100), Duration::from_secs(2)),
    );

    let req = Request::get("http://localhost:8080/health")
        .body(Body::empty())
        .map_err(|e| Error::Executor(io::Error::other(e)))?;
    let res = transport.execute(req).await?;
    let body = res.into_body().collect().await.map_err(Error::Executor)?;

    println!("done after {} attempts: {}", calls.load(Ordering::SeqCst), String::from_utf8_lossy(&body));
    Ok(())
}
