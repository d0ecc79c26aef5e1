//! Minimal HTTP/1.x request-head model.
//!
//! Hosts usually bring their own request parser and only need to hand the
//! bridge a [`RequestHead`]. [`RequestHead::parse`] is provided for hosts
//! that don't, and is what the RFC 6455 handler uses on the buffered
//! handshake bytes.

use crate::error::{Error, Result};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Request line and headers of an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestHead {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request target, e.g. `/chat`.
    pub target: String,
    /// Protocol version, e.g. `HTTP/1.1`.
    pub version: String,
    /// Headers in arrival order, names as received.
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Create a request head without headers.
    #[must_use]
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            version: "HTTP/1.1".into(),
            headers: Vec::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of the header `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Number of times the header `name` occurs.
    #[must_use]
    pub fn header_count(&self, name: &str) -> usize {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .count()
    }

    /// Whether the comma-separated header `name` contains `token`.
    ///
    /// Tokens are trimmed and compared case-insensitively.
    #[must_use]
    pub fn header_has_token(&self, name: &str, token: &str) -> bool {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    /// Parse a request head from the start of `data`.
    ///
    /// Returns `Ok(None)` while the blank line ending the head has not
    /// arrived, otherwise the head and the number of bytes it occupied.
    /// Anything after the head (a request body, or WebSocket frames sent
    /// eagerly behind the handshake) is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the head is not valid UTF-8, the
    /// request line is malformed, or a header line lacks a colon.
    pub fn parse(data: &[u8]) -> Result<Option<(Self, usize)>> {
        let Some(end) = find_subslice(data, HEAD_TERMINATOR) else {
            return Ok(None);
        };
        let consumed = end + HEAD_TERMINATOR.len();

        let text = std::str::from_utf8(&data[..end])
            .map_err(|_| Error::Handshake("Invalid UTF-8".into()))?;
        let mut lines = text.split("\r\n");

        let request_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::Handshake("Empty request".into()))?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let [method, target, version] = parts.as_slice() else {
            return Err(Error::Handshake(format!(
                "Invalid request line: {request_line}"
            )));
        };
        if !version.starts_with("HTTP/") {
            return Err(Error::Handshake(format!("Invalid HTTP version: {version}")));
        }

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Handshake(format!("Malformed header line: {line}")))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Some((
            Self {
                method: (*method).to_string(),
                target: (*target).to_string(),
                version: (*version).to_string(),
                headers,
            },
            consumed,
        )))
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Whether `haystack` contains `needle`, ignoring ASCII case.
pub(crate) fn contains_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack
            .windows(needle.len())
            .any(|w| w.eq_ignore_ascii_case(needle))
}
