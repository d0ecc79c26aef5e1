//! Connection adapter: glues a host HTTP request path and a transport to an
//! optional [`Bridge`].
//!
//! The adapter watches the bytes arriving on one accepted connection. Until
//! the bridge is upgraded every byte goes to the host's request path *and*
//! into a bounded buffer the bridge resolves the handshake from. Afterwards
//! bytes only go to the bridge.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::bridge::{Action, Bridge};
use crate::config::{self, Config};
use crate::error::{Error, Result};
use crate::http::RequestHead;
use crate::protocol::{HandlerFactory, Rfc6455Factory};

/// Whether `head` asks for a WebSocket upgrade.
///
/// ```
/// use rsws_bridge::adapter::is_websocket_request;
/// use rsws_bridge::http::RequestHead;
///
/// let head = RequestHead::new("GET", "/chat")
///     .with_header("Connection", "keep-alive, Upgrade")
///     .with_header("Upgrade", "WebSocket");
/// assert!(is_websocket_request(&head));
/// ```
#[must_use]
pub fn is_websocket_request(head: &RequestHead) -> bool {
    head.method == "GET"
        && head.header_has_token("connection", "upgrade")
        && head
            .header("upgrade")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
}

/// The byte stream underneath a connection.
pub trait Transport {
    /// Write bytes to the peer.
    fn send_data(&mut self, data: &[u8]);

    /// Close the connection, after pending writes if `after_writing`.
    fn close_connection(&mut self, after_writing: bool);

    /// Set or clear the inactivity timeout.
    fn set_inactivity_timeout(&mut self, timeout: Option<Duration>);
}

/// The host server's ordinary HTTP request path.
pub trait HttpHost: Send {
    /// Consume raw bytes. Returns a request head once one is complete.
    fn receive_data(&mut self, data: &[u8]) -> Option<RequestHead>;

    /// Handle a parsed request.
    fn process(&mut self, exchange: Exchange<'_>);
}

/// Request-scoped storage handed to [`HttpHost::process`].
#[derive(Debug)]
pub struct Exchange<'a> {
    request: &'a RequestHead,
    websocket: Option<&'a mut Bridge>,
    hijacked: bool,
}

impl Exchange<'_> {
    /// The request being processed.
    #[must_use]
    pub fn request(&self) -> &RequestHead {
        self.request
    }

    /// The bridge for this connection, if the request is an upgrade.
    pub fn websocket(&mut self) -> Option<&mut Bridge> {
        self.websocket.as_deref_mut()
    }

    /// The bridge owns the response: the host must not complete it or keep
    /// the connection alive.
    #[must_use]
    pub fn is_hijacked(&self) -> bool {
        self.hijacked
    }
}

/// Bytes seen before the upgrade.
#[derive(Debug)]
enum PreUpgradeBuffer {
    Accumulating(BytesMut),
    /// The cap was exceeded; nothing more is kept.
    Discarded,
}

impl Default for PreUpgradeBuffer {
    fn default() -> Self {
        Self::Accumulating(BytesMut::new())
    }
}

impl PreUpgradeBuffer {
    fn push(&mut self, data: &[u8], cap: usize) {
        let Self::Accumulating(buffer) = self else {
            return;
        };
        if buffer.len() + data.len() > cap {
            debug!(
                cap,
                len = buffer.len() + data.len(),
                "pre-upgrade buffer over limit, discarding"
            );
            *self = Self::Discarded;
            return;
        }
        buffer.extend_from_slice(data);
    }
}

/// One accepted connection.
pub struct Connection<H, T> {
    host: H,
    transport: T,
    factory: Arc<dyn HandlerFactory>,
    config: Config,
    buffer: PreUpgradeBuffer,
    request: Option<RequestHead>,
    is_websocket: Option<bool>,
    hijacked: bool,
    bridge: Option<Bridge>,
}

impl<H: HttpHost, T: Transport> Connection<H, T> {
    /// Wrap an accepted connection. Applies `config.idle_timeout` to the
    /// transport.
    pub fn new(host: H, mut transport: T, factory: Arc<dyn HandlerFactory>, config: Config) -> Self {
        transport.set_inactivity_timeout(config.idle_timeout);
        Self {
            host,
            transport,
            factory,
            config,
            buffer: PreUpgradeBuffer::default(),
            request: None,
            is_websocket: None,
            hijacked: false,
            bridge: None,
        }
    }

    /// Wrap an accepted connection using the RFC 6455 handler and the global
    /// configuration.
    pub fn rfc6455(host: H, transport: T) -> Self {
        Self::new(
            host,
            transport,
            Arc::new(Rfc6455Factory),
            config::global().clone(),
        )
    }

    /// Bytes arrived from the peer.
    ///
    /// # Errors
    ///
    /// Failures the bridge could not route to an error callback.
    pub fn on_incoming_bytes(&mut self, data: &[u8]) -> Result<()> {
        trace!(len = data.len(), "incoming bytes");
        match self.bridge.as_mut() {
            Some(bridge) if bridge.is_upgraded() => {
                let result = bridge.receive_data(data);
                self.flush();
                return result;
            }
            _ => {}
        }

        self.buffer
            .push(data, self.config.limits.max_handshake_size);

        if let Some(head) = self.host.receive_data(data) {
            self.on_accept(head);
        }

        let mut result = Ok(());
        if let (Some(bridge), PreUpgradeBuffer::Accumulating(buffer)) =
            (self.bridge.as_mut(), &self.buffer)
        {
            if !bridge.is_upgraded() {
                result = bridge.attempt_upgrade(buffer);
            }
        }
        if self.is_upgraded() {
            self.buffer = PreUpgradeBuffer::default();
        }
        self.flush();
        result
    }

    /// A request head was parsed by the host path.
    pub fn on_accept(&mut self, head: RequestHead) {
        let is_websocket = *self
            .is_websocket
            .get_or_insert_with(|| is_websocket_request(&head));
        if is_websocket {
            self.create_bridge();
        }

        self.host.process(Exchange {
            request: &head,
            websocket: self.bridge.as_mut(),
            hijacked: self.hijacked,
        });
        self.request = Some(head);
        self.flush();
    }

    fn create_bridge(&mut self) {
        let bridge = Bridge::new(Arc::clone(&self.factory), &self.config);
        match self.install_bridge(bridge) {
            Ok(()) => {
                self.hijacked = true;
                debug!("websocket bridge created");
            }
            Err(Error::AlreadyUpgraded) => trace!("websocket bridge already exists"),
            Err(err) => debug!(error = %err, "websocket bridge not installed"),
        }
    }

    /// Attach `bridge` to this connection.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyUpgraded`] if a bridge is already attached.
    pub fn install_bridge(&mut self, bridge: Bridge) -> Result<()> {
        if self.bridge.is_some() {
            return Err(Error::AlreadyUpgraded);
        }
        self.bridge = Some(bridge);
        Ok(())
    }

    /// Run `f` against the bridge, then flush what it queued.
    pub fn with_websocket<R>(&mut self, f: impl FnOnce(&mut Bridge) -> R) -> Option<R> {
        let result = self.bridge.as_mut().map(f);
        self.flush();
        result
    }

    /// Drain the bridge's queued actions into the transport.
    pub fn flush(&mut self) {
        let Some(bridge) = self.bridge.as_mut() else {
            return;
        };
        while let Some(action) = bridge.poll_action() {
            match action {
                Action::Write(data) => self.transport.send_data(&data),
                Action::DisableTimeout => self.transport.set_inactivity_timeout(None),
                Action::Close => self.transport.close_connection(true),
                Action::Abort => {
                    debug!("aborting connection");
                    self.transport.close_connection(false);
                }
            }
        }
    }

    /// The transport closed. Ends the session and drops the bridge.
    ///
    /// # Errors
    ///
    /// A close callback failure with no error callback registered.
    pub fn on_unbind(&mut self) -> Result<()> {
        let Some(mut bridge) = self.bridge.take() else {
            return Ok(());
        };
        debug!(state = %bridge.state(), "unbinding websocket");
        bridge.unbind()
    }
}

impl<H, T> Connection<H, T> {
    /// The request head is a WebSocket upgrade. `false` until a head exists.
    #[must_use]
    pub fn is_websocket_request(&self) -> bool {
        self.is_websocket.unwrap_or(false)
    }

    /// The last request head seen.
    #[must_use]
    pub fn request(&self) -> Option<&RequestHead> {
        self.request.as_ref()
    }

    /// The response belongs to the bridge.
    #[must_use]
    pub fn is_hijacked(&self) -> bool {
        self.hijacked
    }

    /// A bridge exists and is upgraded.
    #[must_use]
    pub fn is_upgraded(&self) -> bool {
        self.bridge.as_ref().is_some_and(Bridge::is_upgraded)
    }

    /// The bridge, if one was created.
    #[must_use]
    pub fn websocket(&self) -> Option<&Bridge> {
        self.bridge.as_ref()
    }

    /// Mutable access to the bridge. Queued actions are not flushed; prefer
    /// [`Connection::with_websocket`].
    pub fn websocket_mut(&mut self) -> Option<&mut Bridge> {
        self.bridge.as_mut()
    }

    /// Bytes buffered for the handshake, or `None` once discarded.
    #[must_use]
    pub fn buffered(&self) -> Option<&[u8]> {
        match &self.buffer {
            PreUpgradeBuffer::Accumulating(buffer) => Some(buffer),
            PreUpgradeBuffer::Discarded => None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
