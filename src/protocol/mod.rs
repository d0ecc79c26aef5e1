//! The contract between the bridge and a WebSocket protocol handler.
//!
//! A protocol handler owns everything on the wire: handshake parsing,
//! the handshake response, frame decoding and encoding. The bridge only
//! ever talks to it through [`ProtocolHandler`], and the handler only ever
//! talks back through a [`Sink`]: outbound bytes, high-level events, and
//! requests to close the transport.
//!
//! Handlers are built by a [`HandlerFactory`] from the bytes buffered so far.
//! The crate ships [`rfc6455::Rfc6455Factory`]; other drafts plug in by
//! implementing the two traits.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod opcode;
pub mod rfc6455;

pub use assembler::MessageAssembler;
pub use frame::Frame;
pub use handshake::{WS_GUID, compute_accept_key};
pub use opcode::OpCode;
pub use rfc6455::{Rfc6455Factory, Rfc6455Handler};

use crate::bridge::ConnectionState;
use crate::error::Result;
use crate::message::{CloseFrame, Message};

/// High-level events a handler reports while processing bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandlerEvent {
    /// The handshake completed; the session is open.
    Open,
    /// A complete data message arrived.
    Message(Message),
    /// A ping arrived (the handler has already answered it).
    Ping(Vec<u8>),
    /// A pong arrived.
    Pong(Vec<u8>),
    /// The session ended.
    Close(Option<CloseFrame>),
}

/// Control frame kinds an application may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    /// Ping frame.
    Ping,
    /// Pong frame.
    Pong,
}

/// Everything a factory needs besides the buffered bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Whether the transport is secure (`wss://`).
    pub secure: bool,
    /// Sub-protocol to accept if the client offers it.
    pub protocol: Option<String>,
    /// Largest incoming frame payload accepted.
    pub max_frame_size: usize,
    /// Largest reassembled message accepted.
    pub max_message_size: usize,
}

/// The outbound side a handler writes to.
pub trait Sink {
    /// Queue bytes for the transport.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Handshake`](crate::Error::Handshake) if the bytes
    /// contradict a provisional handshake reply already on the wire.
    fn send_data(&mut self, data: &[u8]) -> Result<()>;

    /// Report an event to the application.
    fn emit(&mut self, event: HandlerEvent);

    /// Ask for the transport to be closed, optionally after pending writes.
    fn close_connection(&mut self, after_writing: bool);
}

/// A WebSocket protocol handler for one connection.
pub trait ProtocolHandler: Send {
    /// Start processing: send the handshake response, report
    /// [`HandlerEvent::Open`], and process any bytes that arrived behind the
    /// handshake.
    ///
    /// # Errors
    ///
    /// Handshake or protocol failures, or sink errors.
    fn run(&mut self, sink: &mut dyn Sink) -> Result<()>;

    /// Feed bytes received after the handshake.
    ///
    /// # Errors
    ///
    /// [`Error::Handshake`](crate::Error::Handshake) while no session exists,
    /// [`Error::Protocol`](crate::Error::Protocol) with the close code to
    /// answer with during a session.
    fn receive_data(&mut self, data: &[u8], sink: &mut dyn Sink) -> Result<()>;

    /// Send `data` as a single, unfragmented text frame.
    ///
    /// # Errors
    ///
    /// Fails if the session cannot carry data frames.
    fn send_text_frame(&mut self, data: &[u8], sink: &mut dyn Sink) -> Result<()>;

    /// Send a control frame.
    ///
    /// # Errors
    ///
    /// Fails if the session is not open or the body is too large.
    fn send_frame(&mut self, kind: ControlKind, body: &[u8], sink: &mut dyn Sink) -> Result<()>;

    /// Whether the negotiated draft supports ping and pong.
    fn pingable(&self) -> bool;

    /// Current session state.
    fn state(&self) -> ConnectionState;

    /// Start a closing handshake.
    ///
    /// # Errors
    ///
    /// Sink errors.
    fn close_websocket(
        &mut self,
        code: Option<u16>,
        reason: Option<&str>,
        sink: &mut dyn Sink,
    ) -> Result<()>;

    /// The complete handshake response this handler produces.
    fn handshake_bytes(&self) -> Option<&[u8]>;

    /// The transport went away.
    fn unbind(&mut self, _sink: &mut dyn Sink) {}

    /// Apply a new maximum frame size.
    fn set_max_frame_size(&mut self, _size: usize) {}
}

/// Builds protocol handlers from buffered handshake bytes.
pub trait HandlerFactory: Send + Sync {
    /// Build a handler for `buffer`.
    ///
    /// Returns `Ok(None)` while the handshake is incomplete.
    ///
    /// # Errors
    ///
    /// [`Error::Handshake`](crate::Error::Handshake) if the bytes can never
    /// form an acceptable handshake.
    fn build(
        &self,
        buffer: &[u8],
        options: &BuildOptions,
    ) -> Result<Option<Box<dyn ProtocolHandler>>>;
}
