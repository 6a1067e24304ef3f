//! In-flight request tracking.
//!
//! # Responsibilities
//! - Hold a shared trigger hold for the lifetime of every request
//! - Report busy/idle transitions (log + `muxd_busy` gauge)
//! - Let shutdown wait until no request is in flight
//!
//! # Design Decisions
//! - Requests never block on the trigger: while a drain is waiting they are
//!   answered with 503 and `Connection: close`
//! - Waiting for idle runs on a blocking thread with a deadline; a timed-out
//!   wait withdraws and the server admits requests again
//! - `close` keeps the exclusive hold, so a drained server stays closed

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::sync::Trigger;

/// Tracks requests in flight.
#[derive(Debug)]
pub struct Drain {
    trigger: Trigger,
}

impl Drain {
    pub fn new() -> Self {
        let trigger = Trigger::new()
            .on_acquire(|exclusive| {
                if exclusive {
                    tracing::info!("No requests in flight, drain complete");
                } else {
                    tracing::debug!("Server busy");
                    metrics::gauge!("muxd_busy").set(1.0);
                }
            })
            .on_release(|exclusive| {
                if !exclusive {
                    tracing::debug!("Server idle");
                    metrics::gauge!("muxd_busy").set(0.0);
                }
            });
        Self { trigger }
    }

    /// Requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.trigger.shared_count()
    }

    /// Wait until no request is in flight, up to `timeout`.
    ///
    /// New requests are turned away while waiting. Returns `false` if
    /// requests were still running when time ran out.
    pub async fn wait_idle(self: &Arc<Self>, timeout: Duration) -> bool {
        self.settle(timeout, false).await
    }

    /// Like [`wait_idle`](Self::wait_idle), but once idle the drain stays
    /// closed and every later request is turned away.
    pub async fn close(self: &Arc<Self>, timeout: Duration) -> bool {
        self.settle(timeout, true).await
    }

    async fn settle(self: &Arc<Self>, timeout: Duration, keep_closed: bool) -> bool {
        let drain = self.clone();
        let task = tokio::task::spawn_blocking(move || {
            let idle = drain.trigger.try_acquire_exclusive_for(timeout);
            if idle && !keep_closed {
                drain.trigger.release_exclusive();
            }
            idle
        });

        match task.await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(
                    in_flight = self.in_flight(),
                    timeout = ?timeout,
                    "Drain timed out with requests in flight"
                );
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Drain task failed");
                false
            }
        }
    }
}

impl Default for Drain {
    fn default() -> Self {
        Self::new()
    }
}

fn draining_response() -> Response {
    let mut response = (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Middleware holding a shared hold while the inner service runs.
pub async fn track_in_flight_middleware(
    State(drain): State<Arc<Drain>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(_hold) = drain.trigger.try_shared() else {
        tracing::debug!(path = %request.uri().path(), "Rejecting request while draining");
        return draining_response();
    };
    next.run(request).await
}
