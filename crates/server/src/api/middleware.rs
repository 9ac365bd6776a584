//! Request metrics middleware.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{normalize_path, record_request, InFlight};

/// Record latency and outcome of every request, keyed by its normalized path.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());
    let _in_flight = InFlight::enter();
    let started = Instant::now();

    let response = next.run(request).await;

    record_request(
        method.as_str(),
        &path,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}
