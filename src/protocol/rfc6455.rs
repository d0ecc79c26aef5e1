//! RFC 6455 server handler (also serves hybi drafts 07 and 08, which share
//! the framing).

use bytes::{Buf, BytesMut};

use crate::bridge::ConnectionState;
use crate::error::{Error, Result};
use crate::http::RequestHead;
use crate::message::{CloseCode, CloseFrame};
use crate::protocol::frame::MAX_CONTROL_FRAME_PAYLOAD;
use crate::protocol::handshake::{HandshakeRequest, HandshakeResponse};
use crate::protocol::{
    BuildOptions, ControlKind, Frame, HandlerEvent, HandlerFactory, MessageAssembler, OpCode,
    ProtocolHandler, Sink,
};

/// Builds [`Rfc6455Handler`]s.
///
/// Requests without `Sec-WebSocket-Version` (hixie-75/76) are refused as
/// handshake failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rfc6455Factory;

impl HandlerFactory for Rfc6455Factory {
    fn build(
        &self,
        buffer: &[u8],
        options: &BuildOptions,
    ) -> Result<Option<Box<dyn ProtocolHandler>>> {
        let Some((head, consumed)) = RequestHead::parse(buffer)? else {
            return Ok(None);
        };
        let request = HandshakeRequest::from_head(&head)?;
        let mut response = Vec::new();
        HandshakeResponse::from_request(&request, options.protocol.as_deref())
            .write(&mut response)?;

        Ok(Some(Box::new(Rfc6455Handler::new(
            request.version,
            response,
            &buffer[consumed..],
            options,
        ))))
    }
}

/// Server-side session for drafts 07, 08 and 13.
#[derive(Debug)]
pub struct Rfc6455Handler {
    version: u8,
    state: ConnectionState,
    handshake: Vec<u8>,
    read_buf: BytesMut,
    assembler: MessageAssembler,
    max_frame_size: usize,
    close_reported: bool,
    failed: bool,
}

impl Rfc6455Handler {
    /// Create a handler that will answer with `handshake` and then process
    /// `pending`, the bytes that arrived behind the request head.
    #[must_use]
    pub fn new(version: u8, handshake: Vec<u8>, pending: &[u8], options: &BuildOptions) -> Self {
        Self {
            version,
            state: ConnectionState::Handshake,
            handshake,
            read_buf: BytesMut::from(pending),
            assembler: MessageAssembler::new(options.max_message_size),
            max_frame_size: options.max_frame_size,
            close_reported: false,
            failed: false,
        }
    }

    /// Negotiated `Sec-WebSocket-Version`.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    fn process(&mut self, sink: &mut dyn Sink) -> Result<()> {
        if self.failed {
            self.await_close(sink);
            return Ok(());
        }
        let result = self.read_frames(sink);
        if result.is_err() {
            self.failed = true;
            self.assembler.reset();
        }
        result
    }

    fn read_frames(&mut self, sink: &mut dyn Sink) -> Result<()> {
        while self.state.can_receive() {
            let parsed = match Frame::parse(&self.read_buf, self.max_frame_size) {
                Ok(parsed) => parsed,
                Err(err) => {
                    // Framing is lost; nothing behind this header can be trusted.
                    self.read_buf.clear();
                    return Err(err);
                }
            };
            let Some((frame, consumed)) = parsed else {
                break;
            };
            self.read_buf.advance(consumed);
            self.handle_frame(frame, sink)?;
        }
        Ok(())
    }

    /// After a failure only the peer's close frame matters. Anything else,
    /// including input that does not parse, is dropped.
    fn await_close(&mut self, sink: &mut dyn Sink) {
        while self.state.can_receive() {
            match Frame::parse(&self.read_buf, self.max_frame_size) {
                Ok(Some((frame, consumed))) => {
                    self.read_buf.advance(consumed);
                    if frame.opcode == OpCode::Close {
                        let close = parse_close_payload(&frame.payload).ok().flatten();
                        self.finish(close, sink);
                        sink.close_connection(false);
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    self.read_buf.clear();
                    break;
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame, sink: &mut dyn Sink) -> Result<()> {
        if !frame.masked {
            return Err(Error::protocol(
                CloseCode::ProtocolError.as_u16(),
                "Client frame must be masked",
            ));
        }
        if frame.rsv != 0 {
            return Err(Error::protocol(
                CloseCode::ProtocolError.as_u16(),
                "Reserved bits set without negotiated extension",
            ));
        }

        match frame.opcode {
            OpCode::Ping => {
                if self.state == ConnectionState::Open {
                    let pong = Frame::new(true, OpCode::Pong, frame.payload.clone());
                    sink.send_data(&pong.to_bytes())?;
                }
                sink.emit(HandlerEvent::Ping(frame.payload));
            }
            OpCode::Pong => sink.emit(HandlerEvent::Pong(frame.payload)),
            OpCode::Close => {
                let close = parse_close_payload(&frame.payload)?;
                if self.state == ConnectionState::Open {
                    let code = close.as_ref().map(|c| c.code.as_u16());
                    sink.send_data(&Frame::close(code, "").to_bytes())?;
                    self.finish(close, sink);
                    sink.close_connection(true);
                } else {
                    self.finish(close, sink);
                    sink.close_connection(false);
                }
            }
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                // Data after our close frame is discarded.
                if self.state == ConnectionState::Open {
                    if let Some(message) = self.assembler.push(frame)? {
                        sink.emit(HandlerEvent::Message(message));
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self, close: Option<CloseFrame>, sink: &mut dyn Sink) {
        self.state = ConnectionState::Closed;
        self.assembler.reset();
        if !self.close_reported {
            self.close_reported = true;
            sink.emit(HandlerEvent::Close(close));
        }
    }
}

fn parse_close_payload(payload: &[u8]) -> Result<Option<CloseFrame>> {
    match payload {
        [] => Ok(None),
        [_] => Err(Error::protocol(
            CloseCode::ProtocolError.as_u16(),
            "Close frame payload of one byte",
        )),
        [hi, lo, reason @ ..] => {
            let code = CloseCode::from_u16(u16::from_be_bytes([*hi, *lo]));
            if !code.is_valid() {
                return Err(Error::protocol(
                    CloseCode::ProtocolError.as_u16(),
                    format!("Invalid close code: {}", code.as_u16()),
                ));
            }
            let reason = std::str::from_utf8(reason).map_err(|_| {
                Error::protocol(CloseCode::InvalidPayload.as_u16(), "Invalid UTF-8 in close reason")
            })?;
            Ok(Some(CloseFrame::new(code, reason)))
        }
    }
}

impl ProtocolHandler for Rfc6455Handler {
    fn run(&mut self, sink: &mut dyn Sink) -> Result<()> {
        if self.state != ConnectionState::Handshake {
            return Ok(());
        }
        sink.send_data(&self.handshake)?;
        self.state = ConnectionState::Open;
        sink.emit(HandlerEvent::Open);
        self.process(sink)
    }

    fn receive_data(&mut self, data: &[u8], sink: &mut dyn Sink) -> Result<()> {
        match self.state {
            ConnectionState::Handshake => Err(Error::Handshake(
                "Data received before the handshake completed".into(),
            )),
            ConnectionState::Closed => Ok(()),
            _ => {
                self.read_buf.extend_from_slice(data);
                self.process(sink)
            }
        }
    }

    fn send_text_frame(&mut self, data: &[u8], sink: &mut dyn Sink) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(None));
        }
        sink.send_data(&Frame::new(true, OpCode::Text, data.to_vec()).to_bytes())
    }

    fn send_frame(&mut self, kind: ControlKind, body: &[u8], sink: &mut dyn Sink) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(None));
        }
        if body.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlFrameTooLarge(body.len()));
        }
        let opcode = match kind {
            ControlKind::Ping => OpCode::Ping,
            ControlKind::Pong => OpCode::Pong,
        };
        sink.send_data(&Frame::new(true, opcode, body.to_vec()).to_bytes())
    }

    fn pingable(&self) -> bool {
        true
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn close_websocket(
        &mut self,
        code: Option<u16>,
        reason: Option<&str>,
        sink: &mut dyn Sink,
    ) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        self.state = ConnectionState::Closing;
        sink.send_data(&Frame::close(code, reason.unwrap_or("")).to_bytes())
    }

    fn handshake_bytes(&self) -> Option<&[u8]> {
        Some(&self.handshake)
    }

    fn unbind(&mut self, sink: &mut dyn Sink) {
        if self.state != ConnectionState::Handshake {
            self.finish(None, sink);
        }
        self.state = ConnectionState::Closed;
    }

    fn set_max_frame_size(&mut self, size: usize) {
        self.max_frame_size = size;
    }
}
