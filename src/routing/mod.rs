//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, headers)
//!     → mux.rs prepare (bind per-request context value)
//!     → path.rs (normalize request path)
//!     → exact bucket, then prefix buckets from longest to `/`
//!     → matcher.rs (evaluate entry conditions)
//!     → matched Handler, not-found handler, or 404
//!
//! Route Registration (at startup):
//!     add(path, matcher, exact, handler)
//!     → normalize path
//!     → insert into bucket by priority, then registration order
//!     → share as immutable Mux behind Arc
//! ```
//!
//! # Design Decisions
//! - Routes registered at startup, immutable at runtime
//! - No regex and no path parameters (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First accepting entry wins within a bucket

pub mod matcher;
pub mod mux;
pub mod path;

pub use matcher::{AndMatcher, AnyMatcher, HeaderMatcher, Matcher, MethodMatcher};
pub use mux::{handler, Handler, Mux, MuxService, RecoveredPanic, Route, RouteInfo};
pub use path::normalize;
