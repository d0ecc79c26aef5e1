//! The upgrade bridge: per-connection WebSocket state machine.
//!
//! A [`Bridge`] starts out without a protocol handler, in the `handshake`
//! state. [`Bridge::attempt_upgrade`] is fed the bytes buffered so far until
//! the handler factory can build a handler from them; from then on the bridge
//! is *upgraded* and every byte goes to [`Bridge::receive_data`].
//!
//! The bridge performs no I/O. Bytes to write and transport operations are
//! queued as [`Action`]s, which the owning
//! [`Connection`](crate::adapter::Connection) drains into its transport.
//!
//! ## Failure boundary
//!
//! Failures raised while processing input are handled in one place:
//!
//! | failure                 | response                                  |
//! |-------------------------|-------------------------------------------|
//! | [`Error::Handshake`]    | error callback, then abort                |
//! | [`Error::Protocol`]     | error callback, then close with its code  |
//! | anything else           | error callback and close with 3000, or propagate if no error callback |

mod outbound;
mod state;

pub use outbound::Action;
pub use state::ConnectionState;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{self, Config};
use crate::error::{BoxError, Error, Result};
use crate::http::contains_ignore_ascii_case;
use crate::message::{CloseCode, CloseFrame, Message, OutgoingText};
use crate::protocol::{BuildOptions, ControlKind, HandlerEvent, HandlerFactory, ProtocolHandler};

use outbound::Outbound;

/// Header whose presence marks a hixie-76 style handshake.
pub const LEGACY_KEY_MARKER: &[u8] = b"sec-websocket-key2";

/// Stand-in for the 8 key bytes a hixie-76 client sends after its headers.
const LEGACY_FILLER: [u8; 8] = [0; 8];

/// Length of the hixie-76 challenge response appended to the handshake.
pub const LEGACY_CHALLENGE_LEN: usize = 16;

/// Result returned by application callbacks.
pub type CallbackResult = std::result::Result<(), BoxError>;

type OpenCallback = Box<dyn FnMut(&mut Bridge) -> CallbackResult + Send>;
type CloseCallback = Box<dyn FnMut(&mut Bridge, Option<&CloseFrame>) -> CallbackResult + Send>;
type ErrorCallback = Box<dyn FnMut(&mut Bridge, &Error) + Send>;
type MessageCallback = Box<dyn FnMut(&mut Bridge, Message) -> CallbackResult + Send>;
type ControlCallback = Box<dyn FnMut(&mut Bridge, &[u8]) -> CallbackResult + Send>;

#[derive(Default)]
struct Callbacks {
    open: Option<OpenCallback>,
    close: Option<CloseCallback>,
    error: Option<ErrorCallback>,
    message: Option<MessageCallback>,
    ping: Option<ControlCallback>,
    pong: Option<ControlCallback>,
}

/// Invoke a callback slot with `&mut Bridge`.
///
/// The callback is moved out of its slot for the call and put back unless it
/// registered a replacement for itself.
macro_rules! fire {
    ($bridge:ident, $slot:ident $(, $arg:expr)*) => {{
        match $bridge.callbacks.$slot.take() {
            None => Ok(()),
            Some(mut callback) => {
                let result = callback(&mut *$bridge $(, $arg)*);
                if $bridge.callbacks.$slot.is_none() {
                    $bridge.callbacks.$slot = Some(callback);
                }
                result.map_err(Error::from_callback)
            }
        }
    }};
}

/// Per-connection WebSocket bridge.
///
/// Application code registers callbacks and sends through the bridge; the
/// connection adapter feeds it bytes and drains its [`Action`]s.
pub struct Bridge {
    handler: Option<Box<dyn ProtocolHandler>>,
    factory: Arc<dyn HandlerFactory>,
    out: Outbound,
    callbacks: Callbacks,
    max_frame_size: Option<usize>,
    max_message_size: usize,
    secure: bool,
    protocol: Option<String>,
    opened: bool,
}

impl Bridge {
    /// Create a bridge that builds handlers with `factory`.
    #[must_use]
    pub fn new(factory: Arc<dyn HandlerFactory>, config: &Config) -> Self {
        Self {
            handler: None,
            factory,
            out: Outbound::default(),
            callbacks: Callbacks::default(),
            max_frame_size: None,
            max_message_size: config.limits.max_message_size,
            secure: config.secure,
            protocol: config.subprotocol.clone(),
            opened: false,
        }
    }

    // ------------------------------------------------------------------
    // Callback registration
    // ------------------------------------------------------------------

    /// Register the open callback.
    ///
    /// If the session is already open the callback runs right away, exactly
    /// once; a failure it returns goes through the failure boundary.
    ///
    /// # Errors
    ///
    /// Only when the callback runs immediately, fails, and no error callback
    /// is registered.
    pub fn on_open<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(&mut Bridge) -> CallbackResult + Send + 'static,
    {
        self.callbacks.open = Some(Box::new(callback));
        if !self.opened {
            return Ok(());
        }
        match fire!(self, open) {
            Ok(()) => Ok(()),
            Err(err) => self.handle_failure(err),
        }
    }

    /// Register the close callback.
    pub fn on_close<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Bridge, Option<&CloseFrame>) -> CallbackResult + Send + 'static,
    {
        self.callbacks.close = Some(Box::new(callback));
    }

    /// Register the error callback.
    ///
    /// With an error callback registered, failures of other callbacks are
    /// treated as handled and the session is closed with
    /// [`CloseCode::FRAMEWORK_ERROR`].
    pub fn on_error<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Bridge, &Error) + Send + 'static,
    {
        self.callbacks.error = Some(Box::new(callback));
    }

    /// Register the message callback.
    pub fn on_message<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Bridge, Message) -> CallbackResult + Send + 'static,
    {
        self.callbacks.message = Some(Box::new(callback));
    }

    /// Register the ping callback.
    pub fn on_ping<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Bridge, &[u8]) -> CallbackResult + Send + 'static,
    {
        self.callbacks.ping = Some(Box::new(callback));
    }

    /// Register the pong callback.
    pub fn on_pong<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Bridge, &[u8]) -> CallbackResult + Send + 'static,
    {
        self.callbacks.pong = Some(Box::new(callback));
    }

    // ------------------------------------------------------------------
    // Upgrade
    // ------------------------------------------------------------------

    /// A protocol handler exists.
    #[must_use]
    pub fn is_upgraded(&self) -> bool {
        self.handler.is_some()
    }

    /// A provisional legacy reply went out but no handler exists yet.
    #[must_use]
    pub fn is_pending_upgrade(&self) -> bool {
        self.handler.is_none() && self.out.provisional_sent()
    }

    /// Try to build the protocol handler from the bytes buffered so far.
    ///
    /// A no-op once upgraded. While the handshake is incomplete nothing
    /// happens, except for the hixie-76 case: the peer may be stuck behind a
    /// proxy until it sees our response headers, so a provisional reply is
    /// sent once, built from a copy of `buffer` padded with the 8 key bytes
    /// the peer has not sent yet.
    ///
    /// # Errors
    ///
    /// Only application errors from the open callback when no error callback
    /// is registered. Handshake failures abort the connection instead.
    pub fn attempt_upgrade(&mut self, buffer: &[u8]) -> Result<()> {
        if self.handler.is_some() {
            return Ok(());
        }
        let options = self.build_options();
        let result = match self.factory.build(buffer, &options) {
            Ok(Some(handler)) => return self.install(handler),
            Ok(None) => self.send_provisional_reply(buffer, &options),
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) => self.handle_failure(err),
        }
    }

    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            secure: self.secure,
            protocol: self.protocol.clone(),
            max_frame_size: self.max_frame_size(),
            max_message_size: self.max_message_size,
        }
    }

    fn install(&mut self, handler: Box<dyn ProtocolHandler>) -> Result<()> {
        debug!(
            pending = self.out.provisional_sent(),
            "websocket handshake resolved"
        );
        self.out.actions.push_back(Action::DisableTimeout);
        let handler = self.handler.insert(handler);
        let result = handler.run(&mut self.out);
        self.settle(result)
    }

    fn send_provisional_reply(&mut self, buffer: &[u8], options: &BuildOptions) -> Result<()> {
        if self.out.provisional_sent() || !contains_ignore_ascii_case(buffer, LEGACY_KEY_MARKER) {
            return Ok(());
        }

        let mut padded = Vec::with_capacity(buffer.len() + LEGACY_FILLER.len());
        padded.extend_from_slice(buffer);
        padded.extend_from_slice(&LEGACY_FILLER);

        let Some(trial) = self.factory.build(&padded, options)? else {
            return Ok(());
        };
        let Some(reply) = trial
            .handshake_bytes()
            .and_then(|b| b.len().checked_sub(LEGACY_CHALLENGE_LEN).map(|len| &b[..len]))
        else {
            return Ok(());
        };

        debug!(len = reply.len(), "sending provisional reply for legacy handshake");
        self.out.send_provisional(reply.to_vec());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Steady state
    // ------------------------------------------------------------------

    /// Feed bytes received after the upgrade.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] if no handler exists
    /// - a callback failure when no error callback is registered
    pub fn receive_data(&mut self, data: &[u8]) -> Result<()> {
        let Some(handler) = self.handler.as_mut() else {
            return Err(Error::NotOpen("receive data"));
        };
        let result = handler.receive_data(data, &mut self.out);
        self.settle(result)
    }

    /// Send a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidEncoding`] unless the text is UTF-8 or pure ASCII
    /// - [`Error::NotOpen`] before the handler exists
    /// - whatever the handler refuses (e.g. sending while closing)
    pub fn send<'a>(&mut self, text: impl Into<OutgoingText<'a>>) -> Result<()> {
        let text = text.into();
        text.validate()?;
        let Some(handler) = self.handler.as_mut() else {
            return Err(Error::NotOpen("send data"));
        };
        handler.send_text_frame(text.as_bytes(), &mut self.out)
    }

    /// Send a ping. Returns `false` if the negotiated draft has no ping.
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] before the handler exists, or handler refusals.
    pub fn ping(&mut self, body: &[u8]) -> Result<bool> {
        self.send_control(ControlKind::Ping, body, "ping")
    }

    /// Send an unsolicited pong. Returns `false` if the negotiated draft has
    /// no pong.
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] before the handler exists, or handler refusals.
    pub fn pong(&mut self, body: &[u8]) -> Result<bool> {
        self.send_control(ControlKind::Pong, body, "pong")
    }

    fn send_control(&mut self, kind: ControlKind, body: &[u8], op: &'static str) -> Result<bool> {
        let Some(handler) = self.handler.as_mut() else {
            return Err(Error::NotOpen(op));
        };
        if !handler.pingable() {
            return Ok(false);
        }
        handler.send_frame(kind, body, &mut self.out)?;
        Ok(true)
    }

    /// Whether the negotiated draft supports ping and pong.
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] before the handler exists.
    pub fn pingable(&self) -> Result<bool> {
        self.handler
            .as_ref()
            .map(|h| h.pingable())
            .ok_or(Error::NotOpen("test whether pingable"))
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.handler
            .as_ref()
            .map_or(ConnectionState::Handshake, |h| h.state())
    }

    /// Largest incoming frame accepted on this connection.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
            .unwrap_or_else(|| config::global().limits.max_frame_size)
    }

    /// Override (or with `None`, reset) the maximum frame size.
    pub fn set_max_frame_size(&mut self, size: Option<usize>) {
        self.max_frame_size = size;
        let effective = self.max_frame_size();
        if let Some(handler) = self.handler.as_mut() {
            handler.set_max_frame_size(effective);
        }
    }

    /// Close the session.
    ///
    /// With a handler this starts a closing handshake with `code` (default
    /// 1000); without one the connection is aborted.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCloseCode`] for codes that may not be sent.
    pub fn close(&mut self, code: Option<CloseCode>, reason: &str) -> Result<()> {
        let code = code.unwrap_or_default();
        if !code.is_valid() {
            return Err(Error::InvalidCloseCode(code.as_u16()));
        }
        let Some(handler) = self.handler.as_mut() else {
            self.abort();
            return Ok(());
        };
        debug!(code = code.as_u16(), "closing websocket");
        let result = handler.close_websocket(Some(code.as_u16()), Some(reason), &mut self.out);
        self.settle(result)
    }

    /// The transport closed. Lets the handler report the end of the session.
    ///
    /// # Errors
    ///
    /// A close callback failure when no error callback is registered.
    pub fn unbind(&mut self) -> Result<()> {
        if let Some(handler) = self.handler.as_mut() {
            handler.unbind(&mut self.out);
        }
        self.dispatch_events().or_else(|err| self.report(err))
    }

    /// Take the next queued transport action.
    pub fn poll_action(&mut self) -> Option<Action> {
        self.out.actions.pop_front()
    }

    // ------------------------------------------------------------------
    // Event dispatch and failure handling
    // ------------------------------------------------------------------

    /// Dispatch queued handler events, then route whatever failed.
    ///
    /// A failing callback takes precedence over a handler error: the handler
    /// error happened while the callback's failure was still pending.
    fn settle(&mut self, result: Result<()>) -> Result<()> {
        match self.dispatch_events().and(result) {
            Ok(()) => Ok(()),
            Err(err) => self.handle_failure(err),
        }
    }

    fn dispatch_events(&mut self) -> Result<()> {
        while !self.out.events.is_empty() {
            let events = std::mem::take(&mut self.out.events);
            for event in events {
                self.dispatch(event)?;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, event: HandlerEvent) -> Result<()> {
        match event {
            HandlerEvent::Open => {
                if self.opened {
                    return Ok(());
                }
                self.opened = true;
                debug!("websocket open");
                fire!(self, open)
            }
            HandlerEvent::Message(message) => fire!(self, message, message),
            HandlerEvent::Ping(body) => fire!(self, ping, body.as_slice()),
            HandlerEvent::Pong(body) => fire!(self, pong, body.as_slice()),
            HandlerEvent::Close(frame) => {
                debug!(code = ?frame.as_ref().map(|f| f.code.as_u16()), "websocket closed");
                fire!(self, close, frame.as_ref())
            }
        }
    }

    fn handle_failure(&mut self, err: Error) -> Result<()> {
        match err {
            Error::Handshake(_) => {
                warn!(error = %err, "websocket handshake failed, aborting");
                self.trigger_error(&err);
                self.abort();
                Ok(())
            }
            Error::Protocol { code, .. } => {
                warn!(error = %err, "websocket protocol error");
                self.trigger_error(&err);
                self.close_private(code)
            }
            other => {
                if other.is_usage() {
                    debug!(error = %other, "callback misused the bridge");
                } else {
                    warn!(error = %other, "callback failed");
                }
                if !self.trigger_error(&other) {
                    return Err(other);
                }
                self.close_private(CloseCode::FRAMEWORK_ERROR.as_u16())
            }
        }
    }

    /// Close after a failure: a close frame if a session exists, else abort.
    fn close_private(&mut self, code: u16) -> Result<()> {
        let Some(handler) = self.handler.as_mut() else {
            self.abort();
            return Ok(());
        };
        if let Err(err) = handler.close_websocket(Some(code), None, &mut self.out) {
            warn!(error = %err, "close frame could not be sent, aborting");
            self.abort();
        }
        self.dispatch_events().or_else(|err| self.report(err))
    }

    /// Hand an error to the error callback, or back to the caller.
    fn report(&mut self, err: Error) -> Result<()> {
        if self.trigger_error(&err) {
            Ok(())
        } else {
            Err(err)
        }
    }

    fn trigger_error(&mut self, err: &Error) -> bool {
        let Some(mut callback) = self.callbacks.error.take() else {
            return false;
        };
        callback(self, err);
        if self.callbacks.error.is_none() {
            self.callbacks.error = Some(callback);
        }
        true
    }

    fn abort(&mut self) {
        self.out.abort();
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .field("upgraded", &self.is_upgraded())
            .field("pending_upgrade", &self.is_pending_upgrade())
            .field("max_frame_size", &self.max_frame_size)
            .field("queued_actions", &self.out.actions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Rfc6455Factory;
    use crate::protocol::frame::apply_mask;
    use std::sync::Mutex;

    const REQUEST: &[u8] = b"GET /chat HTTP/1.1\r\n\
Host: example.com\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Sec-WebSocket-Version: 13\r\n\
\r\n";

    fn bridge() -> Bridge {
        Bridge::new(Arc::new(Rfc6455Factory), &Config::default())
    }

    fn masked(opcode: u8, payload: &[u8]) -> Vec<u8> {
        let mask = [0xA1, 0xB2, 0xC3, 0xD4];
        let mut out = vec![0x80 | opcode, 0x80 | payload.len() as u8];
        out.extend_from_slice(&mask);
        let mut body = payload.to_vec();
        apply_mask(&mut body, mask);
        out.extend_from_slice(&body);
        out
    }

    fn drain(bridge: &mut Bridge) -> Vec<Action> {
        std::iter::from_fn(|| bridge.poll_action()).collect()
    }

    fn open_bridge() -> Bridge {
        let mut bridge = bridge();
        bridge.attempt_upgrade(REQUEST).unwrap();
        drain(&mut bridge);
        bridge
    }

    #[test]
    fn test_fresh_bridge_is_in_handshake() {
        let bridge = bridge();
        assert_eq!(bridge.state(), ConnectionState::Handshake);
        assert!(!bridge.is_upgraded());
        assert!(!bridge.is_pending_upgrade());
    }

    #[test]
    fn test_upgrade_disables_timeout_and_sends_handshake() {
        let mut bridge = bridge();
        bridge.attempt_upgrade(REQUEST).unwrap();
        let actions = drain(&mut bridge);
        assert_eq!(actions[0], Action::DisableTimeout);
        assert!(matches!(&actions[1], Action::Write(b) if b.starts_with(b"HTTP/1.1 101")));
        assert_eq!(bridge.state(), ConnectionState::Open);
    }

    #[test]
    fn test_attempt_upgrade_is_idempotent() {
        let mut bridge = open_bridge();
        bridge.attempt_upgrade(REQUEST).unwrap();
        assert!(drain(&mut bridge).is_empty());
    }

    #[test]
    fn test_incomplete_handshake_does_nothing() {
        let mut bridge = bridge();
        bridge.attempt_upgrade(&REQUEST[..20]).unwrap();
        assert!(!bridge.is_upgraded());
        assert!(drain(&mut bridge).is_empty());
    }

    #[test]
    fn test_open_callback_fires_once() {
        let count = Arc::new(Mutex::new(0));
        let seen = count.clone();
        let mut bridge = bridge();
        bridge
            .on_open(move |_| {
                *seen.lock().unwrap() += 1;
                Ok(())
            })
            .unwrap();
        bridge.attempt_upgrade(REQUEST).unwrap();
        bridge.attempt_upgrade(REQUEST).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_late_open_callback_fires_immediately() {
        let mut bridge = open_bridge();
        let count = Arc::new(Mutex::new(0));
        let seen = count.clone();
        bridge
            .on_open(move |_| {
                *seen.lock().unwrap() += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_echo_from_message_callback() {
        let mut bridge = open_bridge();
        bridge.on_message(|ws, msg| {
            ws.send(msg.as_text().unwrap_or_default().to_uppercase())?;
            Ok(())
        });
        bridge.receive_data(&masked(0x1, b"hi")).unwrap();
        assert_eq!(drain(&mut bridge), vec![Action::Write(vec![0x81, 0x02, b'H', b'I'])]);
    }

    #[test]
    fn test_send_before_open() {
        let mut bridge = bridge();
        assert_eq!(bridge.send("x"), Err(Error::NotOpen("send data")));
    }

    #[test]
    fn test_encoding_checked_before_handler() {
        let mut bridge = bridge();
        let text = OutgoingText::with_encoding(vec![0xE9], "ISO-8859-1");
        assert!(matches!(
            bridge.send(text),
            Err(Error::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn test_ping_before_open() {
        let mut bridge = bridge();
        let err = bridge.ping(b"").unwrap_err();
        assert_eq!(err.to_string(), "Cannot ping before onopen callback");
        assert_eq!(bridge.pong(b""), Err(Error::NotOpen("pong")));
        assert_eq!(bridge.pingable(), Err(Error::NotOpen("test whether pingable")));
    }

    #[test]
    fn test_ping_after_open() {
        let mut bridge = open_bridge();
        assert_eq!(bridge.ping(b""), Ok(true));
        assert_eq!(drain(&mut bridge), vec![Action::Write(vec![0x89, 0x00])]);
    }

    #[test]
    fn test_receive_before_upgrade() {
        let mut bridge = bridge();
        assert_eq!(
            bridge.receive_data(b"x"),
            Err(Error::NotOpen("receive data"))
        );
    }

    #[test]
    fn test_protocol_error_closes_with_its_code() {
        let mut bridge = open_bridge();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        bridge.on_error(move |_, err| seen.lock().unwrap().push(err.clone()));

        // Unmasked frame from the client.
        bridge.receive_data(&[0x81, 0x01, b'x']).unwrap();

        assert!(matches!(
            errors.lock().unwrap()[0],
            Error::Protocol { code: 1002, .. }
        ));
        assert_eq!(drain(&mut bridge), vec![Action::Write(vec![0x88, 0x02, 0x03, 0xEA])]);
        assert_eq!(bridge.state(), ConnectionState::Closing);
    }

    #[test]
    fn test_application_error_propagates_without_error_callback() {
        let mut bridge = open_bridge();
        bridge.on_message(|_, _| Err("kaboom".into()));
        let err = bridge.receive_data(&masked(0x1, b"x")).unwrap_err();
        assert_eq!(err, Error::Application("kaboom".into()));
    }

    #[test]
    fn test_application_error_handled_closes_with_3000() {
        let mut bridge = open_bridge();
        bridge.on_message(|_, _| Err("kaboom".into()));
        bridge.on_error(|_, _| {});
        bridge.receive_data(&masked(0x1, b"x")).unwrap();
        assert_eq!(drain(&mut bridge), vec![Action::Write(vec![0x88, 0x02, 0x0B, 0xB8])]);
    }

    #[test]
    fn test_callback_may_replace_itself() {
        let mut bridge = open_bridge();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = log.clone();
        bridge.on_message(move |ws, _| {
            first.lock().unwrap().push("first");
            let second = first.clone();
            ws.on_message(move |_, _| {
                second.lock().unwrap().push("second");
                Ok(())
            });
            Ok(())
        });
        bridge.receive_data(&masked(0x1, b"a")).unwrap();
        bridge.receive_data(&masked(0x1, b"b")).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_max_frame_size_override() {
        let mut bridge = bridge();
        assert_eq!(bridge.max_frame_size(), config::global().limits.max_frame_size);
        bridge.set_max_frame_size(Some(3));
        assert_eq!(bridge.max_frame_size(), 3);
        bridge.attempt_upgrade(REQUEST).unwrap();
        drain(&mut bridge);

        bridge.on_error(|_, _| {});
        bridge.receive_data(&masked(0x2, b"four")).unwrap();
        assert_eq!(drain(&mut bridge), vec![Action::Write(vec![0x88, 0x02, 0x03, 0xF1])]);
    }

    #[test]
    fn test_close_without_handler_aborts() {
        let mut bridge = bridge();
        bridge.close(None, "").unwrap();
        assert_eq!(drain(&mut bridge), vec![Action::Abort]);
    }

    #[test]
    fn test_close_rejects_reserved_code() {
        let mut bridge = open_bridge();
        assert_eq!(
            bridge.close(Some(CloseCode::Other(1006)), ""),
            Err(Error::InvalidCloseCode(1006))
        );
    }

    #[test]
    fn test_unbind_fires_close_callback() {
        let mut bridge = open_bridge();
        let closed = Arc::new(Mutex::new(false));
        let seen = closed.clone();
        bridge.on_close(move |_, frame| {
            assert!(frame.is_none());
            *seen.lock().unwrap() = true;
            Ok(())
        });
        bridge.unbind().unwrap();
        assert!(*closed.lock().unwrap());
        assert_eq!(bridge.state(), ConnectionState::Closed);
    }
}
