//! Serial write accumulator.
//!
//! # Responsibilities
//! - Forward writes to an underlying byte sink
//! - Count the bytes that actually reached the sink
//! - Latch the first sink error and refuse further writes until reset
//!
//! # Design Decisions
//! - The latched error is shared (`Arc`) so it can be reported by `sum()` and
//!   carried by every later `PreviousWriteFailed` without cloning `io::Error`
//! - One sink call per write; short writes and errors reach the caller
//!   unchanged, with no retries
//! - Single owner: all operations take `&mut self`

use std::io::{self, Write};
use std::sync::Arc;

use thiserror::Error;

/// Failure returned by [`SequenceWriter`] writes.
#[derive(Debug, Clone, Error)]
pub enum WriteFailure {
    /// The sink rejected this write. Displays the sink's own message.
    #[error(transparent)]
    Sink(Arc<io::Error>),

    /// An earlier write already failed; the sink was not touched.
    #[error("previous write failed: {0}")]
    PreviousWriteFailed(#[source] Arc<io::Error>),
}

impl WriteFailure {
    /// The underlying sink error, regardless of variant.
    pub fn sink_error(&self) -> &io::Error {
        match self {
            WriteFailure::Sink(e) | WriteFailure::PreviousWriteFailed(e) => e,
        }
    }

    /// True when the write was refused because of an earlier failure.
    pub fn is_previous_write_failed(&self) -> bool {
        matches!(self, WriteFailure::PreviousWriteFailed(_))
    }
}

impl From<WriteFailure> for io::Error {
    fn from(failure: WriteFailure) -> Self {
        io::Error::new(failure.sink_error().kind(), failure)
    }
}

/// A byte sink wrapper that accumulates a running total and stops at the
/// first error.
///
/// ```
/// use muxkit::text::SequenceWriter;
///
/// let mut w = SequenceWriter::new(Vec::new());
/// w.write_text("hello world\n").unwrap();
/// w.write_bytes(b"bye world\n").unwrap();
/// assert_eq!(w.sum().0, 22);
/// ```
#[derive(Debug)]
pub struct SequenceWriter<W> {
    sink: W,
    written: usize,
    failed: Option<Arc<io::Error>>,
}

impl<W: Write> SequenceWriter<W> {
    /// Wrap a sink. The running total starts at zero.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            written: 0,
            failed: None,
        }
    }

    /// Hand `buf` to the sink in a single `write` call.
    ///
    /// Returns the sink's own result: `Ok(n)` may be a short write, and an
    /// error is latched as returned. Once any write has failed, every later
    /// call returns [`WriteFailure::PreviousWriteFailed`] with nothing
    /// written until [`reset`](Self::reset) is called.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<usize, WriteFailure> {
        if let Some(err) = &self.failed {
            return Err(WriteFailure::PreviousWriteFailed(err.clone()));
        }

        match self.sink.write(buf) {
            Ok(n) => {
                self.written += n;
                Ok(n)
            }
            Err(e) => {
                tracing::debug!(
                    written = self.written,
                    error = %e,
                    "Sequence writer latched sink error"
                );
                let e = Arc::new(e);
                self.failed = Some(e.clone());
                Err(WriteFailure::Sink(e))
            }
        }
    }

    /// Same contract as [`write_bytes`](Self::write_bytes) for text.
    pub fn write_text(&mut self, text: &str) -> Result<usize, WriteFailure> {
        self.write_bytes(text.as_bytes())
    }

    /// Total bytes written since creation or the last reset, and the raw
    /// latched sink error, if any.
    pub fn sum(&self) -> (usize, Option<&io::Error>) {
        (self.written, self.failed.as_deref())
    }

    /// Clear the running total and the latched error.
    pub fn reset(&mut self) {
        self.written = 0;
        self.failed = None;
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write> Write for SequenceWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(err) = &self.failed {
            return Err(WriteFailure::PreviousWriteFailed(err.clone()).into());
        }
        self.sink.flush()
    }
}
