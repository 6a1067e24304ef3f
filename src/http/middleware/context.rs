//! Request-scoped state injection.
//!
//! # Responsibilities
//! - Let a user function rewrite request extensions before the inner service
//! - Run an optional cleanup once the request is finished
//!
//! # Design Decisions
//! - Cleanup runs from a drop guard, so it also runs when the inner future
//!   is cancelled or unwinds

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

type InjectFn = Arc<dyn Fn(&mut Request<Body>) + Send + Sync>;
type CleanupFn = Arc<dyn Fn() + Send + Sync>;

/// State for [`inject_context_middleware`].
#[derive(Clone)]
pub struct ContextInjector {
    inject: InjectFn,
    cleanup: Option<CleanupFn>,
}

impl ContextInjector {
    pub fn new<F>(inject: F) -> Self
    where
        F: Fn(&mut Request<Body>) + Send + Sync + 'static,
    {
        Self {
            inject: Arc::new(inject),
            cleanup: None,
        }
    }

    /// Run `f` when each request ends.
    pub fn with_cleanup<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cleanup = Some(Arc::new(f));
        self
    }
}

struct CleanupGuard(CleanupFn);

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        (self.0)();
    }
}

/// Middleware applying a [`ContextInjector`] to every request.
pub async fn inject_context_middleware(
    State(injector): State<ContextInjector>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let _cleanup = injector.cleanup.clone().map(CleanupGuard);
    (injector.inject)(&mut request);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use axum::{middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    #[derive(Clone)]
    struct Region(&'static str);

    #[tokio::test]
    async fn test_injects_and_cleans_up() {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let counter = cleaned.clone();
        let injector = ContextInjector::new(|request: &mut Request<Body>| {
            request.extensions_mut().insert(Region("eu-west"));
        })
        .with_cleanup(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let app = Router::new()
            .route("/", get(|Extension(region): Extension<Region>| async move { region.0 }))
            .layer(middleware::from_fn_with_state(injector, inject_context_middleware));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
            let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
            assert_eq!(&body[..], b"eu-west");
        }
        assert_eq!(cleaned.load(Ordering::SeqCst), 2);
    }
}
