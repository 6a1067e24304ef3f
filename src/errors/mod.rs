//! Error helpers shared by the router and the server binary.
//!
//! # Data Flow
//! ```text
//! panic inside a handler
//!     → panic.rs hook records stack
//!     → catch_unwind payload → PanicError
//!
//! fatal error in main
//!     → exit_code.rs walks the cause chain
//!     → process exit code
//! ```

pub mod exit_code;
pub mod panic;

pub use exit_code::{exit_code_of, ExitCodeError};
pub use panic::PanicError;
