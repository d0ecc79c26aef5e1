//! Error types for the upgrade bridge.
//!
//! Every failure the bridge can observe or report is a variant of [`Error`].
//! The variants fall into four groups that the bridge's failure boundary
//! treats differently:
//!
//! - usage errors, returned to the caller of the offending operation
//! - [`Error::Handshake`], answered by aborting the transport
//! - [`Error::Protocol`], answered by a close frame carrying its code
//! - everything else (including [`Error::Application`]), which is handed to
//!   the error callback or propagated when none is registered

use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by application callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while bridging a connection to a WebSocket handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// An operation that needs an established session was called before the
    /// handler existed.
    #[error("Cannot {0} before onopen callback")]
    NotOpen(&'static str),

    /// Outgoing text was neither valid UTF-8 nor pure ASCII.
    #[error("Data sent to WebSocket must be valid UTF-8 but was {encoding} (valid UTF-8: {valid_utf8})")]
    InvalidEncoding {
        /// Encoding label the text was tagged with.
        encoding: String,
        /// Whether the bytes are valid UTF-8, whatever the label says.
        valid_utf8: bool,
    },

    /// The handshake could not be completed. No session exists.
    #[error("Invalid handshake: {0}")]
    Handshake(String),

    /// The peer violated the protocol during an established session.
    #[error("Protocol violation ({code}): {reason}")]
    Protocol {
        /// Close code to send back to the peer.
        code: u16,
        /// Human-readable description.
        reason: String,
    },

    /// An application callback failed.
    #[error("Application error: {0}")]
    Application(String),

    /// A bridge is already installed on this connection.
    #[error("Connection already upgraded to WebSocket")]
    AlreadyUpgraded,

    /// The session is closing or closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// Close code that must not appear in a close frame.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Build a protocol failure with the given close code.
    pub fn protocol(code: u16, reason: impl Into<String>) -> Self {
        Error::Protocol {
            code,
            reason: reason.into(),
        }
    }

    /// Convert a callback failure into a bridge error.
    ///
    /// Errors that already are [`Error`] keep their variant, so a callback
    /// that bubbles up a protocol failure is still closed with its code.
    pub fn from_callback(err: BoxError) -> Self {
        match err.downcast::<Error>() {
            Ok(err) => *err,
            Err(other) => Error::Application(other.to_string()),
        }
    }

    /// Whether this error was raised by misuse of the bridge API.
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::NotOpen(_)
                | Error::InvalidEncoding { .. }
                | Error::InvalidCloseCode(_)
                | Error::ConnectionClosed(_)
                | Error::ControlFrameTooLarge(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
