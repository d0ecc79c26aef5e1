//! Shared fixtures for the integration tests: a recording host and
//! transport, client-side frame helpers, and a scripted legacy-draft
//! handler factory.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rsws_bridge::protocol::frame::apply_mask;
use rsws_bridge::{
    Bridge, BuildOptions, ConnectionState, ControlKind, Error, Exchange, HandlerEvent,
    HandlerFactory, HttpHost, Message, ProtocolHandler, RequestHead, Result, Sink, Transport,
};

pub const UPGRADE_REQUEST: &[u8] = b"GET /chat HTTP/1.1\r\n\
Host: example.com\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Sec-WebSocket-Version: 13\r\n\
\r\n";

pub const ACCEPT_HEADER: &str = "Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

pub const LEGACY_HEAD: &[u8] = b"GET /demo HTTP/1.1\r\n\
Host: example.com\r\n\
Connection: Upgrade\r\n\
Upgrade: WebSocket\r\n\
Sec-WebSocket-Key1: 4 @1  46546xW%0l 1 5\r\n\
Sec-WebSocket-Key2: 12998 5 Y3 1  .P00\r\n\
\r\n";

pub const LEGACY_KEY3: &[u8] = b"^n:ds[4U";

/// Shared, cloneable event log.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// A client frame with FIN set, masked as RFC 6455 requires.
pub fn client_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    client_fragment(true, opcode, payload)
}

pub fn client_fragment(fin: bool, opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mask = [0x37, 0xFA, 0x21, 0x3D];
    let mut out = vec![if fin { 0x80 } else { 0x00 } | opcode];
    match payload.len() {
        len @ 0..=125 => out.push(0x80 | len as u8),
        len @ 126..=0xFFFF => {
            out.push(0x80 | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => {
            out.push(0x80 | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }
    out.extend_from_slice(&mask);
    let mut body = payload.to_vec();
    apply_mask(&mut body, mask);
    out.extend_from_slice(&body);
    out
}

/// An unmasked server frame with a short payload.
pub fn server_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0x80 | opcode, payload.len() as u8];
    out.extend_from_slice(payload);
    out
}

/// Split `bytes` after the first `\r\n\r\n`.
pub fn split_head(bytes: &[u8]) -> (&[u8], &[u8]) {
    let end = bytes
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map_or(bytes.len(), |p| p + 4);
    bytes.split_at(end)
}

// ----------------------------------------------------------------------
// Host and transport
// ----------------------------------------------------------------------

type Setup = Box<dyn FnMut(&mut Bridge) + Send>;

/// Host path that parses one request head and records what it saw.
#[derive(Default)]
pub struct TestHost {
    head_buf: Vec<u8>,
    parsed: bool,
    pub received: Vec<u8>,
    pub requests: Vec<RequestHead>,
    pub hijacked: Vec<bool>,
    setup: Option<Setup>,
}

impl TestHost {
    /// A host that runs `setup` on the bridge of every upgrade request.
    pub fn with_setup(setup: impl FnMut(&mut Bridge) + Send + 'static) -> Self {
        Self {
            setup: Some(Box::new(setup)),
            ..Self::default()
        }
    }
}

impl HttpHost for TestHost {
    fn receive_data(&mut self, data: &[u8]) -> Option<RequestHead> {
        self.received.extend_from_slice(data);
        if self.parsed {
            return None;
        }
        self.head_buf.extend_from_slice(data);
        match RequestHead::parse(&self.head_buf) {
            Ok(Some((head, _))) => {
                self.parsed = true;
                Some(head)
            }
            _ => None,
        }
    }

    fn process(&mut self, mut exchange: Exchange<'_>) {
        self.requests.push(exchange.request().clone());
        self.hijacked.push(exchange.is_hijacked());
        if let (Some(ws), Some(setup)) = (exchange.websocket(), self.setup.as_mut()) {
            setup(ws);
        }
    }
}

/// Transport that records every call.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub written: Vec<u8>,
    pub closed: Option<bool>,
    pub timeouts: Vec<Option<Duration>>,
}

impl RecordingTransport {
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }
}

impl Transport for RecordingTransport {
    fn send_data(&mut self, data: &[u8]) {
        self.written.extend_from_slice(data);
    }

    fn close_connection(&mut self, after_writing: bool) {
        self.closed.get_or_insert(after_writing);
    }

    fn set_inactivity_timeout(&mut self, timeout: Option<Duration>) {
        self.timeouts.push(timeout);
    }
}

/// Records every callback into `log`.
pub fn record_callbacks(ws: &mut Bridge, log: &Log) {
    let l = log.clone();
    ws.on_open(move |_| {
        l.lock().unwrap().push("open".into());
        Ok(())
    })
    .unwrap();
    let l = log.clone();
    ws.on_message(move |_, msg| {
        let entry = match msg {
            Message::Text(text) => format!("text:{text}"),
            Message::Binary(data) => format!("binary:{}", data.len()),
        };
        l.lock().unwrap().push(entry);
        Ok(())
    });
    let l = log.clone();
    ws.on_ping(move |_, body| {
        l.lock().unwrap().push(format!("ping:{}", String::from_utf8_lossy(body)));
        Ok(())
    });
    let l = log.clone();
    ws.on_pong(move |_, body| {
        l.lock().unwrap().push(format!("pong:{}", String::from_utf8_lossy(body)));
        Ok(())
    });
    let l = log.clone();
    ws.on_close(move |_, frame| {
        let entry = match frame {
            Some(frame) => format!("close:{}", frame.code.as_u16()),
            None => "close".into(),
        };
        l.lock().unwrap().push(entry);
        Ok(())
    });
    let l = log.clone();
    ws.on_error(move |_, err| l.lock().unwrap().push(format!("error:{err}")));
}

// ----------------------------------------------------------------------
// Scripted legacy draft
// ----------------------------------------------------------------------

pub const LEGACY_RESPONSE_HEAD: &[u8] = b"HTTP/1.1 101 WebSocket Protocol Handshake\r\n\
Upgrade: WebSocket\r\n\
Connection: Upgrade\r\n\
\r\n";

/// Factory for a hixie-76 style draft: the head is followed by 8 key bytes
/// and the response ends with a 16 byte challenge answer.
///
/// The challenge here is just the key bytes twice; only its length matters
/// to the bridge.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyFactory {
    /// Put the key bytes into a response header, so the provisional reply
    /// built from filler bytes no longer matches the real one.
    pub key_in_headers: bool,
}

impl LegacyFactory {
    pub fn response(&self, key: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        if self.key_in_headers {
            out.extend_from_slice(b"HTTP/1.1 101 WebSocket Protocol Handshake\r\n");
            out.extend_from_slice(format!("X-Key: {key:?}\r\n\r\n").as_bytes());
        } else {
            out.extend_from_slice(LEGACY_RESPONSE_HEAD);
        }
        out.extend_from_slice(key);
        out.extend_from_slice(key);
        out
    }
}

impl HandlerFactory for LegacyFactory {
    fn build(
        &self,
        buffer: &[u8],
        _options: &BuildOptions,
    ) -> Result<Option<Box<dyn ProtocolHandler>>> {
        let (head, rest) = split_head(buffer);
        if rest.len() < 8 || !head.ends_with(b"\r\n\r\n") {
            return Ok(None);
        }
        Ok(Some(Box::new(LegacyHandler {
            state: ConnectionState::Handshake,
            handshake: self.response(&rest[..8]),
            read_buf: rest[8..].to_vec(),
        })))
    }
}

/// `0x00 <utf-8> 0xFF` framing, no control frames.
pub struct LegacyHandler {
    state: ConnectionState,
    handshake: Vec<u8>,
    read_buf: Vec<u8>,
}

impl LegacyHandler {
    fn process(&mut self, sink: &mut dyn Sink) -> Result<()> {
        loop {
            match self.read_buf.as_slice() {
                [0xFF, 0x00, ..] => {
                    self.read_buf.clear();
                    self.state = ConnectionState::Closed;
                    sink.emit(HandlerEvent::Close(None));
                    sink.close_connection(true);
                    return Ok(());
                }
                [0x00, rest @ ..] => {
                    let Some(end) = rest.iter().position(|&b| b == 0xFF) else {
                        return Ok(());
                    };
                    let text = String::from_utf8(rest[..end].to_vec())
                        .map_err(|_| Error::protocol(1007, "bad utf-8"))?;
                    self.read_buf.drain(..end + 2);
                    sink.emit(HandlerEvent::Message(Message::Text(text)));
                }
                [] => return Ok(()),
                _ => return Err(Error::protocol(1002, "bad legacy frame")),
            }
        }
    }
}

impl ProtocolHandler for LegacyHandler {
    fn run(&mut self, sink: &mut dyn Sink) -> Result<()> {
        sink.send_data(&self.handshake)?;
        self.state = ConnectionState::Open;
        sink.emit(HandlerEvent::Open);
        self.process(sink)
    }

    fn receive_data(&mut self, data: &[u8], sink: &mut dyn Sink) -> Result<()> {
        self.read_buf.extend_from_slice(data);
        self.process(sink)
    }

    fn send_text_frame(&mut self, data: &[u8], sink: &mut dyn Sink) -> Result<()> {
        let mut frame = vec![0x00];
        frame.extend_from_slice(data);
        frame.push(0xFF);
        sink.send_data(&frame)
    }

    fn send_frame(&mut self, _kind: ControlKind, _body: &[u8], _sink: &mut dyn Sink) -> Result<()> {
        Ok(())
    }

    fn pingable(&self) -> bool {
        false
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn close_websocket(
        &mut self,
        _code: Option<u16>,
        _reason: Option<&str>,
        sink: &mut dyn Sink,
    ) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        self.state = ConnectionState::Closed;
        sink.send_data(&[0xFF, 0x00])?;
        sink.emit(HandlerEvent::Close(None));
        sink.close_connection(true);
        Ok(())
    }

    fn handshake_bytes(&self) -> Option<&[u8]> {
        Some(&self.handshake)
    }
}
