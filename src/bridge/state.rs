//! Session state as reported by the bridge.

/// WebSocket session state.
///
/// A bridge without a protocol handler is always in `Handshake`; once a
/// handler exists the bridge reports whatever the handler reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Handshake not yet resolved.
    #[default]
    Handshake,
    /// Session established; frames may be exchanged.
    Open,
    /// Close frame sent, waiting for the peer's close frame.
    Closing,
    /// Session fully closed.
    Closed,
}

impl ConnectionState {
    /// Returns `true` only for `Open`.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Returns `true` for `Open` and `Closing`.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Handshake => write!(f, "handshake"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}
