//! Text and byte writers.
//!
//! # Data Flow
//! ```text
//! caller bytes / text
//!     → sequence.rs (count, latch first failure)
//!     → underlying io::Write sink
//! ```

pub mod sequence;

pub use sequence::{SequenceWriter, WriteFailure};
