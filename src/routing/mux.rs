//! Path-prefix request multiplexer.
//!
//! # Responsibilities
//! - Store handlers under exact and prefix keys
//! - Resolve a request to the exact entry, else the longest accepting prefix
//! - Attach a per-request context value before dispatch
//! - Recover handler panics when a panic handler is configured
//!
//! # Design Decisions
//! - Routes are registered with `&mut self`; once shared behind `Arc` the
//!   table is read-only and lookups need no locking
//! - Within a bucket: higher priority first, then registration order
//! - The context value lives in request extensions under a private key type
//! - Without a panic handler, panics are not caught at all

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tower::Service;

use crate::errors::panic::{self as panics, PanicError};
use crate::routing::matcher::Matcher;
use crate::routing::path::{ancestors, normalize};

/// Request handler as stored in the route table.
pub type Handler = Arc<dyn Fn(Request<Body>) -> BoxFuture<'static, Response> + Send + Sync>;

type ContextFn<T> = Arc<dyn Fn(&Request<Body>) -> T + Send + Sync>;
type PanicHandler = Arc<dyn Fn(RecoveredPanic) -> Response + Send + Sync>;

/// Wrap an async function as a [`Handler`].
pub fn handler<F, Fut, R>(f: F) -> Handler
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + 'static,
{
    Arc::new(move |req: Request<Body>| {
        let fut = f(req);
        async move { fut.await.into_response() }.boxed()
    })
}

/// Extension key for the mux context value. Not exported, so only
/// [`Mux::context_of`] can read it.
#[derive(Clone)]
struct MuxValue<T>(T);

/// A panic caught while serving a request.
#[derive(Debug)]
pub struct RecoveredPanic {
    pub method: Method,
    pub path: String,
    pub error: PanicError,
}

/// Route registration with an optional matcher and priority.
pub struct Route {
    path: String,
    exact: bool,
    priority: i32,
    matcher: Option<Arc<dyn Matcher>>,
    handler: Handler,
}

impl Route {
    /// Match `path` itself only.
    pub fn exact(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(path, true, handler)
    }

    /// Match `path` and everything beneath it.
    pub fn prefix(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(path, false, handler)
    }

    fn new(path: impl Into<String>, exact: bool, handler: Handler) -> Self {
        Self {
            path: path.into(),
            exact,
            priority: 0,
            matcher: None,
            handler,
        }
    }

    /// Only accept requests the matcher accepts.
    pub fn when(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matcher = Some(Arc::new(matcher));
        self
    }

    /// Entries with higher priority are tried first within the same key.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

struct Entry {
    matcher: Option<Arc<dyn Matcher>>,
    priority: i32,
    order: usize,
    handler: Handler,
}

impl Entry {
    fn accepts(&self, req: &Request<Body>) -> bool {
        self.matcher.as_ref().map_or(true, |m| m.matches(req))
    }
}

type Bucket = Vec<Entry>;

/// Summary of one registered route, in lookup order within its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub path: String,
    pub exact: bool,
    pub priority: i32,
    /// Registration index across the whole mux.
    pub order: usize,
}

fn scan<'a>(bucket: Option<&'a Bucket>, req: &Request<Body>) -> Option<&'a Entry> {
    bucket?.iter().find(|e| e.accepts(req))
}

/// Hierarchical path-prefix router.
///
/// `T` is the per-request context value produced by the function given to
/// [`with_context`](Self::with_context).
pub struct Mux<T = ()> {
    exact: HashMap<String, Bucket>,
    prefix: HashMap<String, Bucket>,
    next_order: usize,
    context: Option<ContextFn<T>>,
    on_panic: Option<PanicHandler>,
    not_found: Option<Handler>,
}

impl<T> Default for Mux<T> {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            prefix: HashMap::new(),
            next_order: 0,
            context: None,
            on_panic: None,
            not_found: None,
        }
    }
}

impl<T> fmt::Debug for Mux<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut exact: Vec<_> = self.exact.keys().collect();
        let mut prefix: Vec<_> = self.prefix.keys().collect();
        exact.sort();
        prefix.sort();
        f.debug_struct("Mux")
            .field("exact", &exact)
            .field("prefix", &prefix)
            .field("context", &self.context.is_some())
            .field("on_panic", &self.on_panic.is_some())
            .field("not_found", &self.not_found.is_some())
            .finish()
    }
}

impl<T> Mux<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute a context value for every request before it is matched.
    pub fn with_context<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request<Body>) -> T + Send + Sync + 'static,
    {
        self.context = Some(Arc::new(f));
        self
    }

    /// Recover panics raised while serving and answer with `f`.
    pub fn on_panic<F>(mut self, f: F) -> Self
    where
        F: Fn(RecoveredPanic) -> Response + Send + Sync + 'static,
    {
        panics::install_hook();
        self.on_panic = Some(Arc::new(f));
        self
    }

    /// Answer unmatched requests with `handler` instead of a bare 404.
    pub fn not_found(mut self, handler: Handler) -> Self {
        self.not_found = Some(handler);
        self
    }

    /// Register `handler` under the normalized `path`.
    ///
    /// `exact` entries only match the path itself; prefix entries match it
    /// and every path beneath it. A `None` matcher accepts every request.
    pub fn add(
        &mut self,
        path: &str,
        matcher: Option<Arc<dyn Matcher>>,
        exact: bool,
        handler: Handler,
    ) -> &mut Self {
        self.insert(path, matcher, exact, 0, handler)
    }

    /// Register a [`Route`].
    pub fn add_route(&mut self, route: Route) -> &mut Self {
        self.insert(
            &route.path,
            route.matcher,
            route.exact,
            route.priority,
            route.handler,
        )
    }

    /// Shorthand for an exact route without matcher.
    pub fn exact(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.add(path, None, true, handler)
    }

    /// Shorthand for a prefix route without matcher.
    pub fn prefix(&mut self, path: &str, handler: Handler) -> &mut Self {
        self.add(path, None, false, handler)
    }

    fn insert(
        &mut self,
        path: &str,
        matcher: Option<Arc<dyn Matcher>>,
        exact: bool,
        priority: i32,
        handler: Handler,
    ) -> &mut Self {
        let key = normalize(path);
        tracing::debug!(path = %key, exact, priority, "Registering route");

        let order = self.next_order;
        self.next_order += 1;

        let table = if exact { &mut self.exact } else { &mut self.prefix };
        let bucket = table.entry(key).or_default();
        let at = bucket.partition_point(|e| e.priority >= priority);
        bucket.insert(
            at,
            Entry {
                matcher,
                priority,
                order,
                handler,
            },
        );
        self
    }

    fn lookup(&self, req: &Request<Body>) -> Option<&Entry> {
        let path = normalize(req.uri().path());
        if let Some(entry) = scan(self.exact.get(&path), req) {
            return Some(entry);
        }
        let found = ancestors(&path).find_map(|candidate| scan(self.prefix.get(candidate), req));
        found
    }

    /// Registered routes: exact keys first, each group sorted by path.
    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut out = Vec::new();
        for (table, exact) in [(&self.exact, true), (&self.prefix, false)] {
            let mut keys: Vec<&String> = table.keys().collect();
            keys.sort();
            for key in keys {
                out.extend(table[key].iter().map(|e| RouteInfo {
                    path: key.clone(),
                    exact,
                    priority: e.priority,
                    order: e.order,
                }));
            }
        }
        out
    }

    /// Find the handler for `req`: exact entry first, then the longest
    /// prefix whose matcher accepts.
    pub fn match_request(&self, req: &Request<Body>) -> Option<Handler> {
        self.lookup(req).map(|e| e.handler.clone())
    }

    /// Bind the context value for `req`, if a context function is set.
    pub fn prepare(&self, mut req: Request<Body>) -> Request<Body> {
        if let Some(context) = &self.context {
            let value = context(&req);
            req.extensions_mut().insert(MuxValue(value));
        }
        req
    }

    /// The context value bound by [`prepare`](Self::prepare), or
    /// `T::default()` if none is present.
    pub fn context_of(req: &Request<Body>) -> T {
        req.extensions()
            .get::<MuxValue<T>>()
            .map(|v| v.0.clone())
            .unwrap_or_default()
    }

    /// Prepare, match and dispatch `req`.
    pub async fn serve_request(&self, req: Request<Body>) -> Response {
        let Some(on_panic) = &self.on_panic else {
            return self.dispatch(req).await;
        };

        let method = req.method().clone();
        let path = req.uri().path().to_string();
        match AssertUnwindSafe(self.dispatch(req)).catch_unwind().await {
            Ok(response) => response,
            Err(payload) => {
                let error = PanicError::from_payload(payload);
                tracing::error!(
                    method = %method,
                    path = %path,
                    panic = %error.value(),
                    "Recovered panic while serving request"
                );
                metrics::counter!("mux_requests_total", "outcome" => "panic").increment(1);
                on_panic(RecoveredPanic {
                    method,
                    path,
                    error,
                })
            }
        }
    }

    async fn dispatch(&self, req: Request<Body>) -> Response {
        let req = self.prepare(req);
        match self.match_request(&req) {
            Some(handler) => {
                metrics::counter!("mux_requests_total", "outcome" => "matched").increment(1);
                handler(req).await
            }
            None => {
                tracing::debug!(path = %req.uri().path(), "No route matched");
                metrics::counter!("mux_requests_total", "outcome" => "not_found").increment(1);
                match &self.not_found {
                    Some(handler) => handler(req).await,
                    None => (StatusCode::NOT_FOUND, "404 page not found").into_response(),
                }
            }
        }
    }

    /// Share the mux as a `tower::Service`.
    pub fn into_service(self) -> MuxService<T> {
        MuxService {
            mux: Arc::new(self),
        }
    }
}

/// Cloneable `tower::Service` over a shared [`Mux`].
pub struct MuxService<T = ()> {
    mux: Arc<Mux<T>>,
}

impl<T> MuxService<T> {
    pub fn mux(&self) -> &Mux<T> {
        &self.mux
    }
}

impl<T> Clone for MuxService<T> {
    fn clone(&self) -> Self {
        Self {
            mux: self.mux.clone(),
        }
    }
}

impl<T> From<Arc<Mux<T>>> for MuxService<T> {
    fn from(mux: Arc<Mux<T>>) -> Self {
        Self { mux }
    }
}

impl<T> Service<Request<Body>> for MuxService<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mux = self.mux.clone();
        Box::pin(async move { Ok(mux.serve_request(req).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::matcher::MethodMatcher;
    use tower::ServiceExt;

    fn named(name: &'static str) -> Handler {
        handler(move |_req| async move { name })
    }

    async fn explode(_req: Request<Body>) -> &'static str {
        panic!("bang")
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn serve(mux: &Mux, path: &str) -> (StatusCode, String) {
        let response = mux.serve_request(get(path)).await;
        let status = response.status();
        (status, body_text(response).await)
    }

    #[tokio::test]
    async fn test_exact_prefix_and_not_found() {
        let mut mux = Mux::new();
        mux.prefix("/a/", named("H1"))
            .prefix("/a/b/", named("H2"))
            .exact("/a/b/c", named("H3"));

        assert_eq!(serve(&mux, "/a/b/c").await, (StatusCode::OK, "H3".into()));
        assert_eq!(serve(&mux, "/a/b/d").await, (StatusCode::OK, "H2".into()));
        assert_eq!(serve(&mux, "/a/e").await, (StatusCode::OK, "H1".into()));
        assert_eq!(serve(&mux, "/z").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_exact_beats_prefix_at_same_path() {
        let mut mux = Mux::new();
        mux.prefix("/a/b/", named("prefix"))
            .exact("/a/b", named("exact"));

        assert_eq!(serve(&mux, "/a/b/").await.1, "exact");
        assert_eq!(serve(&mux, "/a/b/x").await.1, "prefix");
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let mut mux = Mux::new();
        mux.prefix("/a/b/", named("deep")).prefix("/a/", named("shallow"));

        assert_eq!(serve(&mux, "/a/b/c/").await.1, "deep");
        assert_eq!(serve(&mux, "/a/c/").await.1, "shallow");
    }

    #[tokio::test]
    async fn test_rejecting_matcher_falls_back_to_ancestor() {
        let mut mux = Mux::new();
        mux.prefix("/a/", named("ancestor"));
        mux.add(
            "/a/b",
            Some(Arc::new(MethodMatcher::new([Method::POST]))),
            false,
            named("post-only"),
        );

        assert_eq!(serve(&mux, "/a/b/c").await.1, "ancestor");

        let post = Request::builder()
            .method(Method::POST)
            .uri("/a/b/c")
            .body(Body::empty())
            .unwrap();
        assert_eq!(body_text(mux.serve_request(post).await).await, "post-only");
    }

    #[tokio::test]
    async fn test_first_accepting_entry_in_bucket_wins() {
        let mut mux = Mux::new();
        mux.add("/a/", Some(Arc::new(|_: &Request<Body>| false)), false, named("never"))
            .add("/a/", Some(Arc::new(|_: &Request<Body>| true)), false, named("second"))
            .add("/a/", None, false, named("third"));

        assert_eq!(serve(&mux, "/a/x").await.1, "second");
    }

    #[tokio::test]
    async fn test_priority_orders_within_bucket() {
        let mut mux = Mux::new();
        mux.add_route(Route::prefix("/a", named("low")))
            .add_route(Route::prefix("/a/", named("high")).priority(10))
            .add_route(Route::prefix("/a", named("high-later")).priority(10));

        assert_eq!(serve(&mux, "/a/x").await.1, "high");

        let orders: Vec<(i32, usize)> = mux.routes().iter().map(|r| (r.priority, r.order)).collect();
        assert_eq!(orders, vec![(10, 1), (10, 2), (0, 0)]);
    }

    #[tokio::test]
    async fn test_equivalent_registration_paths() {
        let mut mux = Mux::new();
        mux.exact("//a//b", named("first"))
            .exact("/a/b/", named("second"));

        assert_eq!(serve(&mux, "/a/./b").await.1, "first");
        assert_eq!(mux.exact.len(), 1);
    }

    #[tokio::test]
    async fn test_root_prefix_catches_all() {
        let mut mux = Mux::new();
        mux.prefix("", named("root"));

        assert_eq!(serve(&mux, "/").await.1, "root");
        assert_eq!(serve(&mux, "/deep/er/path").await.1, "root");
    }

    #[tokio::test]
    async fn test_default_not_found() {
        let mux: Mux = Mux::new();
        assert_eq!(serve(&mux, "/anything").await.0, StatusCode::NOT_FOUND);
        assert!(mux.match_request(&get("/anything")).is_none());
    }

    #[tokio::test]
    async fn test_custom_not_found() {
        let mux: Mux = Mux::new().not_found(handler(|_req| async {
            (StatusCode::GONE, "gone")
        }));
        assert_eq!(serve(&mux, "/x").await, (StatusCode::GONE, "gone".into()));
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Tenant(String);

    #[tokio::test]
    async fn test_context_value_reaches_handler() {
        let mut mux = Mux::new().with_context(|req: &Request<Body>| {
            Tenant(
                req.headers()
                    .get("x-tenant")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("none")
                    .to_string(),
            )
        });
        mux.prefix(
            "/",
            handler(|req: Request<Body>| async move { Mux::<Tenant>::context_of(&req).0 }),
        );

        let req = Request::builder()
            .uri("/t")
            .header("x-tenant", "blue")
            .body(Body::empty())
            .unwrap();
        assert_eq!(body_text(mux.serve_request(req).await).await, "blue");
    }

    #[test]
    fn test_context_of_defaults_when_unset() {
        assert_eq!(Mux::<Tenant>::context_of(&get("/")), Tenant::default());

        let mux = Mux::new().with_context(|_: &Request<Body>| Tenant("x".into()));
        let req = mux.prepare(mux.prepare(get("/")));
        assert_eq!(Mux::<Tenant>::context_of(&req), Tenant("x".into()));
    }

    #[tokio::test]
    async fn test_panic_is_recovered() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = seen.clone();
        let mut mux = Mux::new().on_panic(move |recovered: RecoveredPanic| {
            *sink.lock() = Some(recovered.error.clone());
            (StatusCode::INTERNAL_SERVER_ERROR, "recovered").into_response()
        });
        mux.exact("/boom", handler(explode));

        let (status, body) = serve(&mux, "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "recovered");

        let error = seen.lock().take().expect("panic handler called");
        assert_eq!(error.value(), "bang");
        assert!(!error.stack().is_empty());
    }

    #[tokio::test]
    async fn test_panic_in_context_function_is_recovered() {
        let mut mux = Mux::new()
            .with_context(|_: &Request<Body>| -> Tenant { panic!("context") })
            .on_panic(|recovered| {
                (StatusCode::INTERNAL_SERVER_ERROR, recovered.error.value().to_string())
                    .into_response()
            });
        mux.prefix("/", named("unreached"));

        assert_eq!(
            serve_tenant(&mux, "/x").await,
            (StatusCode::INTERNAL_SERVER_ERROR, "context".into())
        );
    }

    async fn serve_tenant(mux: &Mux<Tenant>, path: &str) -> (StatusCode, String) {
        let response = mux.serve_request(get(path)).await;
        let status = response.status();
        (status, body_text(response).await)
    }

    #[tokio::test]
    async fn test_panic_propagates_without_handler() {
        let mut mux: Mux = Mux::new();
        mux.exact("/boom", handler(explode));

        let result = AssertUnwindSafe(mux.serve_request(get("/boom")))
            .catch_unwind()
            .await;
        let payload = result.unwrap_err();
        assert_eq!(panics::payload_message(payload.as_ref()), "bang");
    }

    #[tokio::test]
    async fn test_service_oneshot() {
        let mut mux: Mux = Mux::new();
        mux.prefix("/svc", named("service"));
        let service = mux.into_service();

        let response = service.clone().oneshot(get("/svc/x")).await.unwrap();
        assert_eq!(body_text(response).await, "service");

        let response = service.oneshot(get("/other")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
