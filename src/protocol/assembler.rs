//! Reassembly of fragmented data messages.

use bytes::BytesMut;

use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};
use crate::protocol::{Frame, OpCode};

/// Collects data frames until a frame with FIN set completes a message.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    opcode: Option<OpCode>,
    max_message_size: usize,
}

impl MessageAssembler {
    /// Create an assembler that refuses messages above `max_message_size`.
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            opcode: None,
            max_message_size,
        }
    }

    /// Add a data frame. Returns the complete message once FIN is seen.
    ///
    /// # Errors
    ///
    /// - 1002 for a continuation without a start, or a new message while one
    ///   is still being assembled
    /// - 1009 if the message grows beyond the size limit
    /// - 1007 if a text message is not valid UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        match (frame.opcode, self.opcode) {
            (OpCode::Continuation, None) => {
                return Err(Error::protocol(
                    CloseCode::ProtocolError.as_u16(),
                    "Unexpected continuation frame",
                ));
            }
            (OpCode::Continuation, Some(_)) => {}
            (_, Some(_)) => {
                return Err(Error::protocol(
                    CloseCode::ProtocolError.as_u16(),
                    "Expected continuation frame",
                ));
            }
            (opcode, None) => self.opcode = Some(opcode),
        }

        let size = self.buffer.len() + frame.payload.len();
        if size > self.max_message_size {
            self.reset();
            return Err(Error::protocol(
                CloseCode::MessageTooBig.as_u16(),
                format!("Message too large: {size} bytes (max: {})", self.max_message_size),
            ));
        }
        self.buffer.extend_from_slice(&frame.payload);

        if !frame.fin {
            return Ok(None);
        }

        let payload = self.buffer.split().to_vec();
        match self.opcode.take() {
            Some(OpCode::Text) => String::from_utf8(payload)
                .map(|text| Some(Message::Text(text)))
                .map_err(|_| {
                    Error::protocol(CloseCode::InvalidPayload.as_u16(), "Invalid UTF-8 in text frame")
                }),
            _ => Ok(Some(Message::Binary(payload))),
        }
    }

    /// Whether a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.opcode = None;
    }
}
