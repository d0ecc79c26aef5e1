//! # rsws-bridge - WebSocket upgrades for stream-oriented HTTP servers
//!
//! `rsws-bridge` lets a server that already speaks HTTP/1.x over a byte
//! stream hand individual connections over to a WebSocket protocol handler,
//! without touching its I/O loop.
//!
//! ## Layers
//!
//! - [`adapter::Connection`] sits on one accepted connection. It feeds bytes
//!   to the host's HTTP path, spots upgrade requests, and owns the bridge.
//! - [`bridge::Bridge`] is the per-connection state machine. It resolves the
//!   handshake, routes bytes to the protocol handler, and dispatches events
//!   to application callbacks. It performs no I/O.
//! - [`protocol`] defines the handler contract and ships an RFC 6455 handler.
//! - [`io::serve`] (feature `async-tokio`) drives a connection over any
//!   tokio stream.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rsws_bridge::adapter::{Connection, Exchange, HttpHost};
//! use rsws_bridge::io::{QueuedTransport, serve};
//!
//! impl HttpHost for MyHost {
//!     fn receive_data(&mut self, data: &[u8]) -> Option<RequestHead> { self.parser.feed(data) }
//!
//!     fn process(&mut self, mut exchange: Exchange<'_>) {
//!         if let Some(ws) = exchange.websocket() {
//!             ws.on_message(|ws, msg| Ok(ws.send(msg.as_text().unwrap_or_default())?));
//!         }
//!     }
//! }
//!
//! let mut conn = Connection::rfc6455(MyHost::default(), QueuedTransport::new());
//! serve(&mut stream, &mut conn).await?;
//! ```

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod error;
pub mod http;
pub mod message;
pub mod protocol;

#[cfg(feature = "async-tokio")]
pub mod io;

pub use adapter::{Connection, Exchange, HttpHost, Transport, is_websocket_request};
pub use bridge::{Action, Bridge, CallbackResult, ConnectionState};
pub use config::{Config, Limits};
pub use error::{BoxError, Error, Result};
pub use http::RequestHead;
pub use message::{CloseCode, CloseFrame, Message, OutgoingText};
pub use protocol::{
    BuildOptions, ControlKind, HandlerEvent, HandlerFactory, ProtocolHandler, Rfc6455Factory,
    Sink,
};

#[cfg(feature = "async-tokio")]
pub use io::{QueuedTransport, serve};
