//! Synchronization primitives.
//!
//! # Data Flow
//! ```text
//! acquire_shared / acquire_exclusive
//!     → trigger.rs gate (shared/exclusive hold)
//!     → transition mutex (count update + on_acquire)
//!
//! release_shared / release_exclusive
//!     → transition mutex (count update + on_release)
//!     → gate hold dropped
//! ```

pub mod trigger;

pub use trigger::{ExclusiveHold, SharedHold, Trigger};
