//! WebSocket frame parsing and serialization (RFC 6455).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                Masking key (if present)                       |
//! +---------------------------------------------------------------+
//! |                     Payload data                              |
//! +---------------------------------------------------------------+
//! ```

use bytes::BufMut;

use crate::error::{Error, Result};
use crate::message::CloseCode;
use crate::protocol::OpCode;

/// Maximum payload size for control frames.
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// XOR `data` with the 4-byte masking key.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

fn protocol_error(reason: impl Into<String>) -> Error {
    Error::protocol(CloseCode::ProtocolError.as_u16(), reason)
}

/// A single WebSocket frame with an unmasked payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// RSV1-3 bits, in the low three bits.
    pub rsv: u8,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Whether the frame arrived masked.
    pub masked: bool,
    /// Payload data, already unmasked.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame with no reserved bits set.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv: 0,
            opcode,
            masked: false,
            payload,
        }
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let mut payload = Vec::new();
        if let Some(code) = code {
            payload.put_u16(code);
            payload.extend_from_slice(reason.as_bytes());
        }
        Self::new(true, OpCode::Close, payload)
    }

    /// Parse one frame from the start of `buf`.
    ///
    /// Returns `Ok(None)` until the whole frame is buffered. The declared
    /// payload length is checked against `max_payload` as soon as the header
    /// is readable, so an oversized frame is refused before its payload is
    /// buffered.
    ///
    /// # Errors
    ///
    /// - 1002 for reserved opcodes or malformed control frames
    /// - 1009 if the payload exceeds `max_payload`
    pub fn parse(buf: &[u8], max_payload: usize) -> Result<Option<(Self, usize)>> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let fin = buf[0] & 0x80 != 0;
        let rsv = (buf[0] >> 4) & 0x07;
        let opcode = OpCode::from_u8(buf[0] & 0x0F)?;
        let masked = buf[1] & 0x80 != 0;

        let (payload_len, mut offset) = match buf[1] & 0x7F {
            len @ 0..=125 => (u64::from(len), 2),
            126 => {
                if buf.len() < 4 {
                    return Ok(None);
                }
                (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
            }
            _ => {
                if buf.len() < 10 {
                    return Ok(None);
                }
                let mut len = [0u8; 8];
                len.copy_from_slice(&buf[2..10]);
                (u64::from_be_bytes(len), 10)
            }
        };

        if opcode.is_control() {
            if !fin {
                return Err(protocol_error("Control frames cannot be fragmented"));
            }
            if payload_len > MAX_CONTROL_FRAME_PAYLOAD as u64 {
                return Err(protocol_error(format!(
                    "Control frame payload too large: {payload_len} bytes"
                )));
            }
        }

        let payload_len = usize::try_from(payload_len)
            .ok()
            .filter(|len| *len <= max_payload)
            .ok_or_else(|| {
                Error::protocol(
                    CloseCode::MessageTooBig.as_u16(),
                    format!("Frame too large: {payload_len} bytes (max: {max_payload})"),
                )
            })?;

        let mask = if masked {
            if buf.len() < offset + 4 {
                return Ok(None);
            }
            let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
            offset += 4;
            Some(key)
        } else {
            None
        };

        let total = offset + payload_len;
        if buf.len() < total {
            return Ok(None);
        }

        let mut payload = buf[offset..total].to_vec();
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        Ok(Some((
            Self {
                fin,
                rsv,
                opcode,
                masked,
                payload,
            },
            total,
        )))
    }

    /// Append the unmasked wire form of this frame to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        let len = self.payload.len();
        out.reserve(len + 10);
        out.put_u8(u8::from(self.fin) << 7 | (self.rsv & 0x07) << 4 | self.opcode.as_u8());
        if len < 126 {
            out.put_u8(len as u8);
        } else if let Ok(len) = u16::try_from(len) {
            out.put_u8(126);
            out.put_u16(len);
        } else {
            out.put_u8(127);
            out.put_u64(len as u64);
        }
        out.extend_from_slice(&self.payload);
    }

    /// The unmasked wire form of this frame.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write(&mut out);
        out
    }
}
