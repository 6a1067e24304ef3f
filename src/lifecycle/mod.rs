//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → drain closes → axum stops accepting and closes connections
//!
//! Drain (drain.rs):
//!     every request takes a shared Trigger hold without blocking
//!     → shutdown takes the exclusive hold to confirm nothing is in flight
//!     → requests arriving meanwhile get 503
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: drain, stop accept, close connections, exit
//! - Drain has a timeout: exit after the deadline even if requests remain

pub mod drain;
pub mod shutdown;
pub mod signals;

pub use drain::{track_in_flight_middleware, Drain};
pub use shutdown::Shutdown;
