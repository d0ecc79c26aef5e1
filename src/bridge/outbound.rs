//! The bridge's outbound half: what handlers write to, and what the
//! connection adapter drains into the transport.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{HandlerEvent, Sink};

/// Transport-level work queued by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write bytes to the peer.
    Write(Vec<u8>),
    /// Turn off any inactivity timeout on the transport.
    DisableTimeout,
    /// Close the transport once queued writes are flushed.
    Close,
    /// Tear the transport down immediately.
    Abort,
}

/// Outbound state shared by the bridge and its handler.
#[derive(Debug, Default)]
pub(crate) struct Outbound {
    pub(crate) actions: VecDeque<Action>,
    pub(crate) events: Vec<HandlerEvent>,
    provisional_sent: bool,
    provisional: Vec<u8>,
    stripped: bool,
}

impl Outbound {
    /// Queue bytes without any legacy stripping.
    pub(crate) fn transmit(&mut self, data: Vec<u8>) {
        if !data.is_empty() {
            trace!(len = data.len(), "queueing outbound bytes");
            self.actions.push_back(Action::Write(data));
        }
    }

    /// Record a provisional handshake reply and put it on the wire.
    pub(crate) fn send_provisional(&mut self, reply: Vec<u8>) {
        self.provisional_sent = true;
        self.provisional = reply.clone();
        self.transmit(reply);
    }

    pub(crate) fn provisional_sent(&self) -> bool {
        self.provisional_sent
    }

    /// Queue bytes from the handler.
    ///
    /// After a provisional reply the handler's real handshake starts with a
    /// copy of what the peer already has; only the rest is sent.
    pub(crate) fn send_outbound_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.provisional_sent && !self.stripped {
            let Some(rest) = data.strip_prefix(self.provisional.as_slice()) else {
                return Err(Error::Handshake(
                    "Handshake response does not extend the provisional reply".into(),
                ));
            };
            self.stripped = true;
            self.transmit(rest.to_vec());
            return Ok(());
        }
        self.transmit(data.to_vec());
        Ok(())
    }

    pub(crate) fn abort(&mut self) {
        self.actions.push_back(Action::Abort);
    }
}

impl Sink for Outbound {
    fn send_data(&mut self, data: &[u8]) -> Result<()> {
        self.send_outbound_bytes(data)
    }

    fn emit(&mut self, event: HandlerEvent) {
        self.events.push(event);
    }

    fn close_connection(&mut self, after_writing: bool) {
        self.actions.push_back(if after_writing {
            Action::Close
        } else {
            Action::Abort
        });
    }
}
