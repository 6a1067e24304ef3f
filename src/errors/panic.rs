//! Recovered panics as errors.
//!
//! # Responsibilities
//! - Turn a `catch_unwind` payload into a displayable error
//! - Keep the stack trace of the panic site for the panic handler
//!
//! # Design Decisions
//! - A process-wide panic hook records the trace in a thread-local slot,
//!   chained in front of whatever hook was installed before
//! - The slot is read on the same thread that caught the panic; when it is
//!   empty the trace is captured at the recovery site instead

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;

use thiserror::Error;

thread_local! {
    static LAST_PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Install the stack-recording panic hook. Safe to call repeatedly.
pub fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let stack = Backtrace::force_capture().to_string();
            LAST_PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            previous(info);
        }));
    });
}

/// Take the stack recorded for the most recent panic on this thread.
pub fn take_stack() -> String {
    LAST_PANIC_STACK
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

/// A recovered panic: its value and the stack it unwound from.
#[derive(Debug, Clone, Error)]
#[error("{value}\n\n{stack}")]
pub struct PanicError {
    value: String,
    stack: String,
}

impl PanicError {
    pub fn new(value: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            stack: stack.into(),
        }
    }

    /// Build from a `catch_unwind` payload, attaching the recorded stack.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        Self::new(payload_message(payload.as_ref()), take_stack())
    }

    /// The panic value as text.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }
}

/// Render a panic payload. `panic!` produces `&str` or `String`; anything
/// else is opaque.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::catch_unwind;

    #[test]
    fn test_display_format() {
        let err = PanicError::new("bang", "frame 0\nframe 1");
        assert_eq!(err.to_string(), "bang\n\nframe 0\nframe 1");
        assert_eq!(err.value(), "bang");
    }

    #[test]
    fn test_from_payload_records_stack() {
        install_hook();
        let payload = catch_unwind(|| panic!("bang")).unwrap_err();
        let err = PanicError::from_payload(payload);

        assert_eq!(err.value(), "bang");
        assert!(!err.stack().is_empty());
    }

    #[test]
    fn test_formatted_payload() {
        let payload = catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(payload_message(payload.as_ref()), "code 7");

        let payload = catch_unwind(|| std::panic::panic_any(42u32)).unwrap_err();
        assert_eq!(payload_message(payload.as_ref()), "Box<dyn Any>");
    }
}
