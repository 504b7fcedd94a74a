//! Error handling module
//!
//! Defines the request-path error type that handlers and middleware return
//! and that the boundary adapter converts into an HTTP response.

use http::StatusCode;
use thiserror::Error;

/// A structured request-path error carrying an HTTP status code and an
/// optional underlying error.
///
/// Handlers and middleware return `Error` values instead of writing failure
/// responses themselves; the error propagates back up the middleware chain
/// verbatim and becomes bytes on the wire only at the boundary adapter.
/// Programming mistakes (bad patterns, late middleware registration) are not
/// `Error`s — those panic at registration time.
#[derive(Error, Debug)]
#[error("request failed with status {status}")]
pub struct Error {
    status: StatusCode,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create an error from a status code alone.
    pub fn from_status(status: StatusCode) -> Self {
        Error { status, source: None }
    }

    /// Create an error from a status code and an underlying error value.
    pub fn new(status: StatusCode, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error {
            status,
            source: Some(source.into()),
        }
    }

    /// Create an error from a status code and a plain message.
    pub fn with_message(status: StatusCode, message: impl Into<String>) -> Self {
        Error {
            status,
            source: Some(message.into().into()),
        }
    }

    /// The HTTP status code this error maps to.
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Human-readable message for the response body: the underlying error
    /// if one is present, the canonical status reason otherwise.
    pub fn message(&self) -> String {
        match &self.source {
            Some(err) => err.to_string(),
            None => self
                .status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
        }
    }
}

impl From<StatusCode> for Error {
    fn from(status: StatusCode) -> Self {
        Error::from_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_error_uses_canonical_reason() {
        let err = Error::from_status(StatusCode::NOT_FOUND);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Not Found");
    }

    #[test]
    fn wrapped_error_message_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "backend exploded");
        let err = Error::new(StatusCode::BAD_GATEWAY, io);
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.message(), "backend exploded");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn message_error_round_trips() {
        let err = Error::with_message(StatusCode::FORBIDDEN, "nope");
        assert_eq!(err.message(), "nope");
    }
}
