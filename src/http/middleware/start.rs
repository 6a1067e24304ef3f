//! Request start timestamps.

use std::time::{Duration, Instant};

use axum::{body::Body, http::Request, middleware::Next, response::Response};

/// Extension key; private so the stamp can only come from this module.
#[derive(Debug, Clone, Copy)]
struct RequestStart(Instant);

/// Record the current instant on the request.
pub fn stamp(request: &mut Request<Body>) {
    request.extensions_mut().insert(RequestStart(Instant::now()));
}

/// When the request was stamped, if it was.
pub fn start<B>(request: &Request<B>) -> Option<Instant> {
    request.extensions().get::<RequestStart>().map(|s| s.0)
}

/// Time elapsed since the request was stamped.
pub fn since<B>(request: &Request<B>) -> Option<Duration> {
    start(request).map(|t| t.elapsed())
}

/// Middleware stamping every request as it enters the stack.
pub async fn request_start_middleware(mut request: Request<Body>, next: Next) -> Response {
    stamp(&mut request);
    next.run(request).await
}
