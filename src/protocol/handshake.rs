//! Server side of the RFC 6455 opening handshake.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::http::RequestHead;

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Protocol versions (drafts 07, 08 and RFC 6455) this handshake accepts.
pub const SUPPORTED_VERSIONS: [u8; 3] = [7, 8, 13];

/// Headers that must appear at most once.
const SINGLE_HEADERS: [&str; 5] = [
    "host",
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
];

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// ```
/// use rsws_bridge::protocol::compute_accept_key;
///
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// The parts of an upgrade request the response depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// The Sec-WebSocket-Key header value.
    pub key: String,
    /// The Sec-WebSocket-Version header value.
    pub version: u8,
    /// Offered sub-protocols, in client preference order.
    pub protocols: Vec<String>,
}

impl HandshakeRequest {
    /// Validate an upgrade request head.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if:
    /// - the method is not `GET` or the version is not `HTTP/1.1`
    /// - a security-relevant header is repeated
    /// - `Upgrade`, `Connection`, `Host`, `Sec-WebSocket-Key` or
    ///   `Sec-WebSocket-Version` is missing or wrong
    /// - the key does not decode to 16 bytes
    /// - the version is not one of [`SUPPORTED_VERSIONS`]
    pub fn from_head(head: &RequestHead) -> Result<Self> {
        if head.method != "GET" {
            return Err(Error::Handshake(format!(
                "Expected GET method, got {}",
                head.method
            )));
        }
        if head.version != "HTTP/1.1" {
            return Err(Error::Handshake(format!(
                "Expected HTTP/1.1, got {}",
                head.version
            )));
        }
        if let Some(name) = SINGLE_HEADERS
            .iter()
            .find(|name| head.header_count(name) > 1)
        {
            return Err(Error::Handshake(format!("Duplicate header: {name}")));
        }

        let upgrade = head
            .header("upgrade")
            .ok_or_else(|| Error::Handshake("Missing Upgrade header".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::Handshake(format!("Invalid Upgrade header: {upgrade}")));
        }
        if !head.header_has_token("connection", "upgrade") {
            return Err(Error::Handshake("Invalid Connection header".into()));
        }
        if head.header("host").is_none_or(str::is_empty) {
            return Err(Error::Handshake("Missing Host header".into()));
        }

        let key = head
            .header("sec-websocket-key")
            .ok_or_else(|| Error::Handshake("Missing Sec-WebSocket-Key header".into()))?;
        match BASE64.decode(key) {
            Ok(decoded) if decoded.len() == 16 => {}
            Ok(decoded) => {
                return Err(Error::Handshake(format!(
                    "Sec-WebSocket-Key must be 16 bytes, got {}",
                    decoded.len()
                )));
            }
            Err(_) => {
                return Err(Error::Handshake(
                    "Invalid Sec-WebSocket-Key: not valid Base64".into(),
                ));
            }
        }

        let version_str = head
            .header("sec-websocket-version")
            .ok_or_else(|| Error::Handshake("Missing Sec-WebSocket-Version header".into()))?;
        let version: u8 = version_str
            .parse()
            .ok()
            .filter(|v| SUPPORTED_VERSIONS.contains(v))
            .ok_or_else(|| {
                Error::Handshake(format!("Unsupported WebSocket version: {version_str}"))
            })?;

        let protocols = head
            .header("sec-websocket-protocol")
            .map(|p| {
                p.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            key: key.to_string(),
            version,
            protocols,
        })
    }
}

/// The server's `101 Switching Protocols` answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// The selected sub-protocol, if any.
    pub protocol: Option<String>,
}

impl HandshakeResponse {
    /// Answer `req`, selecting `supported` only if the client offered it.
    #[must_use]
    pub fn from_request(req: &HandshakeRequest, supported: Option<&str>) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
            protocol: supported
                .filter(|p| req.protocols.iter().any(|offered| offered == p))
                .map(str::to_string),
        }
    }

    /// Write the HTTP response to a buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the protocol contains CR or LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());
        if let Some(ref proto) = self.protocol {
            if proto.contains(['\r', '\n']) {
                return Err(Error::Handshake(
                    "Sec-WebSocket-Protocol contains CR or LF".into(),
                ));
            }
            buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {proto}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }
}
