//! Configuration and limits for bridged connections.
//!
//! A [`Config`] is handed to every [`Connection`](crate::adapter::Connection).
//! One configuration can additionally be installed process-wide with
//! [`Config::install`]; its `max_frame_size` is the fallback for bridges
//! that carry no per-connection override.

use std::sync::OnceLock;
use std::time::Duration;

static GLOBAL: OnceLock<Config> = OnceLock::new();

/// Resource limits for bridged connections.
///
/// These limits bound the memory a single connection can pin before and
/// after the upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single incoming frame in bytes.
    ///
    /// Default: 10 MB (10 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of a reassembled message in bytes.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of bytes buffered before the handshake resolves.
    ///
    /// Once exceeded the pre-upgrade buffer is discarded for good.
    /// Default: 10000
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 10 * 1024 * 1024,   // 10 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_handshake_size: 10_000,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_handshake_size,
        }
    }

}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Whether connections arrive over a secure transport.
    ///
    /// TLS is terminated by the host; the flag is only passed on to protocol
    /// handlers (legacy drafts echo it in the `Sec-WebSocket-Location`).
    /// Default: false
    pub secure: bool,

    /// Sub-protocol the server is willing to speak, if any.
    ///
    /// Default: None
    pub subprotocol: Option<String>,

    /// Read buffer size used by the tokio driver (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,

    /// Inactivity timeout applied to plain HTTP connections by the tokio
    /// driver. Upgraded connections disable it.
    ///
    /// Default: 30 seconds
    pub idle_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            secure: false,
            subprotocol: None,
            read_buffer_size: 8192,
            idle_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the default maximum frame size.
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.limits.max_frame_size = size;
        self
    }

    /// Mark connections as arriving over a secure transport.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the sub-protocol offered during negotiation.
    #[must_use]
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocol = Some(protocol.into());
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the pre-upgrade inactivity timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Install this configuration as the process-wide default.
    ///
    /// Only the first call wins; later calls hand the rejected configuration
    /// back. Call it at startup, before any connection is accepted.
    ///
    /// # Errors
    ///
    /// Returns the configuration unchanged if a global one is already set.
    pub fn install(self) -> std::result::Result<(), Config> {
        GLOBAL.set(self)
    }
}

/// The process-wide configuration.
///
/// Falls back to [`Config::default`] if none was installed.
pub fn global() -> &'static Config {
    GLOBAL.get_or_init(Config::default)
}
