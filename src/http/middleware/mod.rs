//! Request middleware.
//!
//! # Data Flow
//! ```text
//! Incoming Request
//!     → start.rs (stamp arrival time)
//!     → context.rs (inject request-scoped state, schedule cleanup)
//!     → methods.rs (405 for methods outside the allow-list)
//!     → inner service / mux handler
//! ```
//!
//! # Design Decisions
//! - Plain `async fn` middleware for `axum::middleware::from_fn*`
//! - State types are cheap to clone (`Arc` inside)
//! - Extension keys are private types; only accessor functions read them

pub mod context;
pub mod methods;
pub mod start;

pub use context::{inject_context_middleware, ContextInjector};
pub use methods::{allow_methods, allow_methods_middleware, AllowMethods};
pub use start::{request_start_middleware, since, start};
