//! Raw failures as handed to the classifier
//!
//! Operations fail with whatever error type they like. Anything that converts
//! into a [`RawFailure`] can be classified; the conversions below cover plain
//! messages, I/O errors and already-classified errors.

use std::io;

use super::constants::UNKNOWN_FAILURE_MESSAGE;
use super::error::ClassifiedError;

/// Structural hint about how a failure happened, independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FailureShape {
    /// Nothing is known beyond the message.
    #[default]
    Unspecified,
    /// The operation gave up waiting.
    Timeout,
    /// The transport failed before any response arrived.
    Transport,
}

/// An unclassified failure: optional message, HTTP status, error code and shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFailure {
    message: Option<String>,
    status: Option<u16>,
    code: Option<String>,
    shape: FailureShape,
}

impl RawFailure {
    /// A failure with nothing but a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// A failure that only carries an HTTP status.
    pub fn from_status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// A timed-out operation.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(message).with_shape(FailureShape::Timeout)
    }

    /// A transport-level failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(message).with_shape(FailureShape::Transport)
    }

    /// Set the message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the upstream error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Set the structural shape.
    pub fn with_shape(mut self, shape: FailureShape) -> Self {
        self.shape = shape;
        self
    }

    /// The message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The message, or a generic placeholder when there is none.
    pub fn message_or_default(&self) -> &str {
        self.message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(UNKNOWN_FAILURE_MESSAGE)
    }

    /// HTTP status, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Upstream error code, if any.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Structural shape.
    pub fn shape(&self) -> FailureShape {
        self.shape
    }
}

impl From<&str> for RawFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for RawFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<io::Error> for RawFailure {
    fn from(err: io::Error) -> Self {
        let shape = match err.kind() {
            io::ErrorKind::TimedOut => FailureShape::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable => FailureShape::Transport,
            _ => FailureShape::Unspecified,
        };
        Self::new(err.to_string()).with_shape(shape)
    }
}

impl From<tokio::time::error::Elapsed> for RawFailure {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::timeout(err.to_string())
    }
}

impl From<ClassifiedError> for RawFailure {
    fn from(error: ClassifiedError) -> Self {
        Self {
            message: Some(error.raw_message().to_owned()),
            status: error.status(),
            code: error.code().map(str::to_owned),
            shape: FailureShape::Unspecified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_falls_back_to_placeholder() {
        assert_eq!(RawFailure::default().message_or_default(), UNKNOWN_FAILURE_MESSAGE);
        assert_eq!(RawFailure::new("  ").message_or_default(), UNKNOWN_FAILURE_MESSAGE);
        assert_eq!(RawFailure::new("boom").message_or_default(), "boom");
    }

    #[test]
    fn io_errors_carry_their_shape() {
        let timed_out: RawFailure = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        let refused: RawFailure = io::Error::new(io::ErrorKind::ConnectionRefused, "no").into();
        let other: RawFailure = io::Error::other("disk").into();

        assert_eq!(timed_out.shape(), FailureShape::Timeout);
        assert_eq!(refused.shape(), FailureShape::Transport);
        assert_eq!(other.shape(), FailureShape::Unspecified);
    }

    #[test]
    fn builder_sets_every_field() {
        let failure = RawFailure::default()
            .with_message("nope")
            .with_status(418)
            .with_code("TEAPOT");

        assert_eq!(failure.message(), Some("nope"));
        assert_eq!(failure.status(), Some(418));
        assert_eq!(failure.code(), Some("TEAPOT"));
    }
}
