//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum serve, graceful shutdown)
//!     → request.rs (assign / propagate request ID)
//!     → middleware/ (start stamp, in-flight tracking, method filter)
//!     → routing::Mux (prepare, match, dispatch, panic recovery)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use request::{request_id, X_REQUEST_ID};
pub use server::{build_mux, HttpServer, RequestMeta, ServerError};
