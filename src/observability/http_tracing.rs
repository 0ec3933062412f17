//! # HTTP Request Tracing Middleware
//!
//! Wraps every management API request in a `request_span!` and records
//! request count and latency.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{debug, Instrument};

use crate::observability::metrics::record_http_request;
use crate::request_span;

pub async fn trace_http_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let span = request_span!(method, path);
    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status().as_u16();
    let elapsed = start.elapsed();

    span.in_scope(|| {
        debug!(status, elapsed_ms = elapsed.as_millis() as u64, "Request completed");
    });

    record_http_request(&method, &path, status, elapsed.as_secs_f64());
    response
}
