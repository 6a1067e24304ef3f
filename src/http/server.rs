//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the Mux from configured routes
//! - Wrap it in an axum Router as the fallback service
//! - Wire up middleware (tracing, timeout, request ID, start stamp, drain)
//! - Serve until shutdown, draining in-flight requests before closing connections

use std::error::Error as StdError;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{status::InvalidStatusCode, HeaderName, Method, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{RouteConfig, ServerConfig, StaticResponse};
use crate::http::middleware::{allow_methods, request_start_middleware, since, AllowMethods};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::lifecycle::{shutdown, track_in_flight_middleware, Drain};
use crate::routing::{handler, Handler, HeaderMatcher, Mux, RecoveredPanic, Route};

/// How long connections may stay open once the drain has finished.
pub const CONNECTION_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Per-request value the server's mux binds before dispatch.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Value of `x-request-id`, or empty.
    pub request_id: String,
}

impl RequestMeta {
    fn from_request(request: &Request<Body>) -> Self {
        Self {
            request_id: request_id(request).unwrap_or_default().to_string(),
        }
    }
}

/// Errors from serving.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("route {route:?}: {source}")]
    Route {
        route: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// HTTP server for a configured mux.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    drain: Arc<Drain>,
}

impl HttpServer {
    /// Create a server whose mux is built from `config.routes`.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let mux = build_mux(&config)?;
        Ok(Self::with_mux(config, mux))
    }

    /// Create a server around a caller-built mux.
    pub fn with_mux(config: ServerConfig, mux: Mux<RequestMeta>) -> Self {
        for route in mux.routes() {
            tracing::debug!(
                path = %route.path,
                exact = route.exact,
                priority = route.priority,
                order = route.order,
                "Route registered"
            );
        }

        let drain = Arc::new(Drain::new());
        let router = Self::build_router(&config, mux, drain.clone());
        Self {
            router,
            config,
            drain,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, mux: Mux<RequestMeta>, drain: Arc<Drain>) -> Router {
        Router::new()
            .fallback_service(mux.into_service())
            .layer(middleware::from_fn_with_state(drain, track_in_flight_middleware))
            .layer(middleware::from_fn(request_start_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The axum router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown_rx` fires, then drain.
    ///
    /// Shutdown first closes the drain: new requests get 503 while in-flight
    /// ones finish, for at most `timeouts.drain_secs`. Only then are
    /// connections shut down gracefully. Connections still open
    /// [`CONNECTION_CLOSE_GRACE`] after that are dropped.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let drain_timeout = Duration::from_secs(self.config.timeouts.drain_secs);
        let (drained_tx, drained_rx) = oneshot::channel::<()>();
        let drain = self.drain.clone();
        let graceful = async move {
            shutdown::wait(shutdown_rx).await;
            tracing::info!(in_flight = drain.in_flight(), "Shutdown requested, draining");
            if !drain.close(drain_timeout).await {
                tracing::warn!("Stopping with requests still in flight");
            }
            let _ = drained_tx.send(());
        };
        let hard_stop = async move {
            match drained_rx.await {
                Ok(()) => tokio::time::sleep(CONNECTION_CLOSE_GRACE).await,
                Err(_) => std::future::pending::<()>().await,
            }
        };

        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(graceful)
            .into_future();
        tokio::select! {
            result = serve => result?,
            _ = hard_stop => {
                tracing::warn!("Connections still open after drain, closing them");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn route_error(route: &str) -> impl Fn(Box<dyn StdError + Send + Sync>) -> ServerError + '_ {
    move |source| ServerError::Route {
        route: route.to_string(),
        source,
    }
}

/// Build the mux described by `config`.
pub fn build_mux(config: &ServerConfig) -> Result<Mux<RequestMeta>, ServerError> {
    let mut mux = Mux::new()
        .with_context(RequestMeta::from_request)
        .on_panic(panic_response);
    if let Some(response) = &config.not_found {
        let not_found = static_handler("not_found", response)
            .map_err(|e| route_error("not_found")(e.into()))?;
        mux = mux.not_found(not_found);
    }

    for route in &config.routes {
        mux.add_route(route_from_config(route)?);
    }
    Ok(mux)
}

fn route_from_config(config: &RouteConfig) -> Result<Route, ServerError> {
    let invalid = route_error(&config.name);

    let mut handler =
        static_handler(&config.name, &config.response).map_err(|e| invalid(e.into()))?;
    if !config.methods.is_empty() {
        let methods = config
            .methods
            .iter()
            .map(|m| Method::from_bytes(m.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.into()))?;
        let allow = AllowMethods::new(methods).map_err(|e| invalid(e.into()))?;
        handler = allow_methods(allow, handler);
    }

    let route = if config.exact {
        Route::exact(config.path.clone(), handler)
    } else {
        Route::prefix(config.path.clone(), handler)
    };
    let route = route.priority(config.priority);

    match &config.require_header {
        Some(header) => {
            let name = HeaderName::from_bytes(header.as_bytes()).map_err(|e| invalid(e.into()))?;
            Ok(route.when(HeaderMatcher::present(name)))
        }
        None => Ok(route),
    }
}

fn static_handler(name: &str, response: &StaticResponse) -> Result<Handler, InvalidStatusCode> {
    let status = StatusCode::from_u16(response.status)?;
    let body = response.body.clone();
    let name: Arc<str> = name.into();
    Ok(handler(move |request: Request<Body>| {
        let meta = Mux::<RequestMeta>::context_of(&request);
        tracing::debug!(
            route = %name,
            request_id = %meta.request_id,
            elapsed = ?since(&request),
            "Serving static route"
        );
        let body = body.clone();
        async move { (status, body) }
    }))
}

fn panic_response(recovered: RecoveredPanic) -> Response {
    tracing::error!(
        method = %recovered.method,
        path = %recovered.path,
        stack = %recovered.error.stack(),
        "Handler panicked"
    );
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}
