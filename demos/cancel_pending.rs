//! Cancel a request that is waiting between attempts.
use http::{Request, Response, StatusCode};
use retrans::prelude::*;
use std::io;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let executor = tower::service_fn(|_req: Request<Body>| async {
        let mut res = Response::new(Body::from("busy"));
        *res.status_mut() = StatusCode::BAD_GATEWAY;
        Ok::<_, io::Error>(res)
    });
    let transport = RetryingTransport::new(
        executor,
        RetryStatus5xx::new(10),
        Delay::constant(Duration::from_secs(30)),
    );

    let mut req = Request::post("http://localhost:8080/jobs")
        .body(Body::from(r#"{"job":"reindex"}"#))
        .unwrap_or_default();
    let id = RequestId::get_or_insert(&mut req);

    let pending = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.execute(req).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("in flight: {}", transport.in_flight());
    println!("cancel {}: {}", id, transport.cancel(&id));

    match pending.await {
        Ok(Err(err)) if err.is_cancelled() => println!("stopped: {}", err),
        Ok(other) => println!("unexpected: {:?}", other.map(|res| res.status())),
        Err(join) => println!("task failed: {}", join),
    }
}
