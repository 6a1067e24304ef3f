//! Errors that carry a process exit code.

use std::error::Error as StdError;
use std::process::ExitCode;

use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Wraps an error with the exit code the process should end with.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ExitCodeError {
    code: u8,
    source: BoxError,
}

impl ExitCodeError {
    pub fn new(code: u8, source: impl Into<BoxError>) -> Self {
        Self {
            code,
            source: source.into(),
        }
    }

    /// Like [`new`](Self::new), rejecting codes outside `0..=255`.
    pub fn try_new(code: i32, source: impl Into<BoxError>) -> Option<Self> {
        u8::try_from(code).ok().map(|code| Self::new(code, source))
    }

    pub fn code(&self) -> u8 {
        self.code
    }
}

/// Walk the cause chain of `err` and return the first carried exit code,
/// or `default` when none is found.
pub fn exit_code_of(err: &(dyn StdError + 'static), default: u8) -> u8 {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(carrier) = e.downcast_ref::<ExitCodeError>() {
            return carrier.code;
        }
        current = e.source();
    }
    default
}

impl From<&ExitCodeError> for ExitCode {
    fn from(err: &ExitCodeError) -> Self {
        ExitCode::from(err.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("startup failed")]
    struct Startup(#[source] ExitCodeError);

    #[test]
    fn test_direct_code() {
        let err = ExitCodeError::new(3, "config missing");
        assert_eq!(err.to_string(), "config missing");
        assert_eq!(exit_code_of(&err, 1), 3);
    }

    #[test]
    fn test_code_found_in_chain() {
        let err = Startup(ExitCodeError::new(78, "bad config"));
        assert_eq!(exit_code_of(&err, 1), 78);
    }

    #[test]
    fn test_default_when_absent() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "plain");
        assert_eq!(exit_code_of(&err, 1), 1);
    }

    #[test]
    fn test_range_checked() {
        assert!(ExitCodeError::try_new(256, "too big").is_none());
        assert!(ExitCodeError::try_new(-1, "negative").is_none());
        assert_eq!(ExitCodeError::try_new(255, "max").unwrap().code(), 255);
    }
}
