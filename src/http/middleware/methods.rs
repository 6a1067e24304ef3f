//! HTTP method allow-list.
//!
//! Requests whose method is not allowed get `405 Method Not Allowed` with an
//! `Allow` header listing the accepted methods. Usable as axum middleware
//! around a whole service, or as a wrapper around a single mux handler.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, header::InvalidHeaderValue, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;

use crate::routing::Handler;

/// Set of methods a route or service accepts.
#[derive(Debug, Clone)]
pub struct AllowMethods {
    methods: Vec<Method>,
    allow_header: HeaderValue,
}

impl AllowMethods {
    /// Fails only if a method name is not valid header text.
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Result<Self, InvalidHeaderValue> {
        let methods: Vec<Method> = methods.into_iter().collect();
        let joined = methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let allow_header = HeaderValue::from_str(&joined)?;
        Ok(Self {
            methods,
            allow_header,
        })
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    fn reject(&self, method: &Method) -> Response {
        tracing::debug!(method = %method, allowed = ?self.allow_header, "Method not allowed");
        let mut response = (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response();
        response
            .headers_mut()
            .insert(header::ALLOW, self.allow_header.clone());
        response
    }
}

/// Middleware rejecting methods outside the allow-list.
///
/// Use with `axum::middleware::from_fn_with_state(Arc::new(allow), allow_methods_middleware)`.
pub async fn allow_methods_middleware(
    State(allow): State<Arc<AllowMethods>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if allow.allows(request.method()) {
        next.run(request).await
    } else {
        allow.reject(request.method())
    }
}

/// Wrap a single mux handler with a method allow-list.
pub fn allow_methods(allow: AllowMethods, inner: Handler) -> Handler {
    let allow = Arc::new(allow);
    Arc::new(move |request: Request<Body>| {
        if allow.allows(request.method()) {
            inner(request)
        } else {
            let response = allow.reject(request.method());
            futures_util::future::ready(response).boxed()
        }
    })
}
