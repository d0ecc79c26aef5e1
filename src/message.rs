//! Messages delivered to application callbacks, close codes, and the
//! encoding-tagged text accepted by [`Bridge::send`](crate::Bridge::send).

use std::borrow::Cow;

use crate::error::{Error, Result};

/// WebSocket close status code per RFC 6455 Section 7.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001).
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Unsupported data (1003).
    UnsupportedData,
    /// Invalid payload (1007), e.g. non-UTF-8 text.
    InvalidPayload,
    /// Policy violation (1008).
    PolicyViolation,
    /// Message too big (1009).
    MessageTooBig,
    /// Internal error (1011).
    InternalError,
    /// Any other code (3000-4999 for frameworks and applications).
    Other(u16),
}

impl CloseCode {
    /// Code used when an application callback fails and no protocol-defined
    /// code applies. 3000 is the first code reserved for frameworks.
    pub const FRAMEWORK_ERROR: CloseCode = CloseCode::Other(3000);

    /// Create a `CloseCode` from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    /// Get the numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => *code,
        }
    }

    /// Check if this close code may be put on the wire.
    ///
    /// Valid: 1000-1003, 1007-1014, 3000-4999.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self.as_u16(), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }

    /// Check if this close code is reserved (1004-1006, 1015) and must never
    /// be sent in a close frame.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self.as_u16(), 1004..=1006 | 1015)
    }
}

/// Close frame contents: status code and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close status code.
    pub code: CloseCode,
    /// Human-readable reason for closing.
    pub reason: String,
}

impl CloseFrame {
    /// Create a new close frame with the given code and reason.
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A data message received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A text message (UTF-8 encoded).
    Text(String),
    /// A binary message (arbitrary bytes).
    Binary(Vec<u8>),
}

impl Message {
    /// Create a text message.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    /// Create a binary message.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    /// Borrow the text content, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            Message::Binary(_) => None,
        }
    }

    /// Borrow the raw payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(s) => s.as_bytes(),
            Message::Binary(data) => data,
        }
    }
}

/// Label carried by text produced as Rust strings.
pub const UTF8: &str = "UTF-8";

/// Text handed to [`Bridge::send`](crate::Bridge::send), tagged with the
/// encoding its producer claims it is in.
///
/// Rust strings always convert with the UTF-8 tag. Bytes coming from
/// elsewhere (a template engine, a legacy database column) keep whatever
/// label they were read with, and are only accepted if they are UTF-8 or
/// pure ASCII.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingText<'a> {
    bytes: Cow<'a, [u8]>,
    encoding: Cow<'a, str>,
}

impl<'a> OutgoingText<'a> {
    /// Wrap bytes tagged with an arbitrary encoding label.
    pub fn with_encoding(bytes: impl Into<Cow<'a, [u8]>>, encoding: impl Into<Cow<'a, str>>) -> Self {
        Self {
            bytes: bytes.into(),
            encoding: encoding.into(),
        }
    }

    /// The encoding label.
    #[must_use]
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// The raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn is_utf8_tagged(&self) -> bool {
        self.encoding.eq_ignore_ascii_case("utf-8") || self.encoding.eq_ignore_ascii_case("utf8")
    }

    /// Check that the text can go out as a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEncoding`] unless the bytes are valid UTF-8
    /// under a UTF-8 tag, or pure ASCII under any tag.
    pub fn validate(&self) -> Result<()> {
        let valid_utf8 = std::str::from_utf8(&self.bytes).is_ok();
        if (self.is_utf8_tagged() && valid_utf8) || self.bytes.is_ascii() {
            return Ok(());
        }
        Err(Error::InvalidEncoding {
            encoding: self.encoding.to_string(),
            valid_utf8,
        })
    }
}

impl<'a> From<&'a str> for OutgoingText<'a> {
    fn from(s: &'a str) -> Self {
        Self::with_encoding(s.as_bytes(), UTF8)
    }
}

impl From<String> for OutgoingText<'static> {
    fn from(s: String) -> Self {
        Self::with_encoding(s.into_bytes(), UTF8)
    }
}

impl<'a> From<&'a String> for OutgoingText<'a> {
    fn from(s: &'a String) -> Self {
        Self::from(s.as_str())
    }
}
